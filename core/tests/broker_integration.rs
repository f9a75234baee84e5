//! Integration tests for sentinel credential materialization.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use warmstart::{
    AuthRecord, CredentialBroker, Environment, MaterializeOutcome, ProviderSpec, SandboxIdentity,
    SENTINEL_REFRESH,
};

fn sandbox_env(home: &Path, extra: &[(&str, &str)]) -> Environment {
    let mut pairs: Vec<(String, String)> = vec![
        ("SANDBOX_ID".into(), "test-sandbox".into()),
        ("CONTROL_PLANE_URL".into(), "https://cp.example.com".into()),
        ("SANDBOX_AUTH_TOKEN".into(), "tok".into()),
        ("REPO_OWNER".into(), "acme".into()),
        ("REPO_NAME".into(), "app".into()),
        ("HOME".into(), home.to_string_lossy().into_owned()),
    ];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Environment::from_pairs(pairs)
}

fn auth_file(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("opencode").join("auth.json")
}

#[test]
fn startup_writes_sentinel_for_openai() {
    let home = TempDir::new().expect("failed to create home");
    let env = sandbox_env(home.path(), &[("OPENAI_OAUTH_REFRESH_TOKEN", "rt_real_secret")]);

    let broker = CredentialBroker::from_env(env).expect("identity should be complete");
    let outcomes = broker.materialize_all().unwrap();
    assert!(matches!(
        outcomes[0].1,
        MaterializeOutcome::Written { with_account_id: false, .. }
    ));

    let raw = std::fs::read_to_string(auth_file(home.path())).unwrap();
    assert!(!raw.contains("rt_real_secret"));

    let data: std::collections::BTreeMap<String, AuthRecord> = serde_json::from_str(&raw).unwrap();
    assert_eq!(data["openai"], AuthRecord::sentinel(None));
    assert_eq!(data["openai"].refresh, SENTINEL_REFRESH);
    assert!(!raw.contains("accountId"));
}

#[test]
fn account_id_presence_follows_environment() {
    for account in [None, Some("acct_xyz")] {
        let home = TempDir::new().expect("failed to create home");
        let mut extra = vec![("OPENAI_OAUTH_REFRESH_TOKEN", "rt_abc")];
        if let Some(account) = account {
            extra.push(("OPENAI_OAUTH_ACCOUNT_ID", account));
        }

        let broker = CredentialBroker::from_env(sandbox_env(home.path(), &extra)).unwrap();
        broker.materialize(&ProviderSpec::openai()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(auth_file(home.path())).unwrap())
                .unwrap();
        assert_eq!(
            value["openai"].get("accountId").and_then(|v| v.as_str()),
            account
        );
    }
}

#[test]
fn startup_without_tokens_touches_nothing() {
    let home = TempDir::new().expect("failed to create home");
    let broker = CredentialBroker::from_env(sandbox_env(home.path(), &[])).unwrap();

    let outcomes = broker.materialize_all().unwrap();

    assert!(outcomes
        .iter()
        .all(|(_, outcome)| *outcome == MaterializeOutcome::Skipped));
    assert!(std::fs::read_dir(home.path()).unwrap().next().is_none());
}

#[test]
fn startup_fails_fast_without_identity() {
    let home = TempDir::new().expect("failed to create home");
    let env = Environment::from_pairs([
        ("HOME", home.path().to_string_lossy().as_ref()),
        ("OPENAI_OAUTH_REFRESH_TOKEN", "rt_real_secret"),
    ]);

    let err = SandboxIdentity::from_env(&env).unwrap_err();
    assert!(err.to_string().contains("SANDBOX_ID"));
    assert!(CredentialBroker::from_env(env).is_err());
    assert!(!auth_file(home.path()).exists());
}

#[test]
fn child_processes_never_see_consumed_variables() {
    let home = TempDir::new().expect("failed to create home");
    let env = sandbox_env(
        home.path(),
        &[
            ("OPENAI_OAUTH_REFRESH_TOKEN", "rt_real_secret"),
            ("OPENAI_OAUTH_ACCOUNT_ID", "acct_xyz"),
        ],
    );

    let broker = CredentialBroker::from_env(env).unwrap();
    broker.materialize_all().unwrap();
    let child = broker.child_environment();

    assert!(child.get("OPENAI_OAUTH_REFRESH_TOKEN").is_none());
    assert!(child.get("OPENAI_OAUTH_ACCOUNT_ID").is_none());
    assert!(child.get("SANDBOX_AUTH_TOKEN").is_none());
    assert_eq!(child.get("SANDBOX_ID"), Some("test-sandbox"));
}

#[test]
fn token_matching_account_id_text_is_still_written() {
    let home = TempDir::new().expect("failed to create home");
    let env = sandbox_env(
        home.path(),
        &[
            ("OPENAI_OAUTH_REFRESH_TOKEN", "acct_xyz_rt"),
            ("OPENAI_OAUTH_ACCOUNT_ID", "acct_xyz_rt_owner"),
        ],
    );

    let broker = CredentialBroker::from_env(env).unwrap();
    let outcome = broker.materialize(&ProviderSpec::openai()).unwrap();

    assert!(matches!(
        outcome,
        MaterializeOutcome::Written { with_account_id: true, .. }
    ));
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(auth_file(home.path())).unwrap()).unwrap();
    assert_eq!(value["openai"]["refresh"], SENTINEL_REFRESH);
    assert_eq!(value["openai"]["accountId"], "acct_xyz_rt_owner");
}
