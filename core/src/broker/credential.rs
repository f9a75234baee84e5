//! Sentinel credential records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;

use super::provider::ProviderSpec;

/// Refresh value written in place of the real token.
pub const SENTINEL_REFRESH: &str = "managed-by-control-plane";

/// Credential type written for every provider.
pub const CREDENTIAL_TYPE: &str = "oauth";

/// Returns true if `refresh` is the control-plane sentinel.
pub fn is_sentinel(refresh: &str) -> bool {
    refresh == SENTINEL_REFRESH
}

/// A provider credential read from the environment.
///
/// Holds the real refresh token in memory only; [`CredentialEntry::to_record`]
/// is the sole way to produce something writable, and it drops the token.
#[derive(Clone)]
pub struct CredentialEntry {
    provider: String,
    refresh_token: String,
    account_id: Option<String>,
}

impl CredentialEntry {
    /// Reads a provider's credential, or `None` if its refresh token is absent.
    pub fn from_env(spec: &ProviderSpec, env: &Environment) -> Option<Self> {
        let refresh_token = env.get(&spec.refresh_token_var)?.to_string();
        Some(Self {
            provider: spec.name.clone(),
            refresh_token,
            account_id: env.get(&spec.account_id_var).map(String::from),
        })
    }

    /// Provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Account id, if one was provided.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// The real refresh token. Never write this anywhere.
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// The on-disk record for this credential, carrying the sentinel.
    pub fn to_record(&self) -> AuthRecord {
        AuthRecord::sentinel(self.account_id.clone())
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("provider", &self.provider)
            .field("refresh_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// One provider entry of the credential file.
///
/// Shape: `{"type": "oauth", "refresh": ..., "access": "", "expires": 0, "accountId"?: ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub refresh: String,
    pub access: String,
    pub expires: u64,
    #[serde(rename = "accountId", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl AuthRecord {
    /// Sentinel record: already expired, so tools refresh on first use.
    pub fn sentinel(account_id: Option<String>) -> Self {
        Self {
            kind: CREDENTIAL_TYPE.to_string(),
            refresh: SENTINEL_REFRESH.to_string(),
            access: String::new(),
            expires: 0,
            account_id,
        }
    }

    /// Returns true if refreshing this record must go through the control plane.
    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_absent_without_refresh_token() {
        let env = Environment::from_pairs([("OPENAI_OAUTH_ACCOUNT_ID", "acct_xyz")]);
        assert!(CredentialEntry::from_env(&ProviderSpec::openai(), &env).is_none());
    }

    #[test]
    fn record_never_contains_real_token() {
        let env = Environment::from_pairs([("OPENAI_OAUTH_REFRESH_TOKEN", "rt_real_secret")]);
        let entry = CredentialEntry::from_env(&ProviderSpec::openai(), &env).unwrap();

        assert_eq!(entry.refresh_token(), "rt_real_secret");
        let json = serde_json::to_string(&entry.to_record()).unwrap();
        assert!(!json.contains("rt_real_secret"));
        assert!(entry.to_record().is_sentinel());
    }

    #[test]
    fn record_serializes_exact_shape() {
        let record = AuthRecord::sentinel(None);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "oauth",
                "refresh": "managed-by-control-plane",
                "access": "",
                "expires": 0
            })
        );

        let with_account = serde_json::to_value(AuthRecord::sentinel(Some("acct_xyz".into()))).unwrap();
        assert_eq!(with_account["accountId"], "acct_xyz");
    }

    #[test]
    fn entry_debug_redacts_token() {
        let env = Environment::from_pairs([("OPENAI_OAUTH_REFRESH_TOKEN", "rt_real_secret")]);
        let entry = CredentialEntry::from_env(&ProviderSpec::openai(), &env).unwrap();
        assert!(!format!("{:?}", entry).contains("rt_real_secret"));
    }

    #[test]
    fn non_sentinel_records_are_detected() {
        let mut record = AuthRecord::sentinel(None);
        record.refresh = "rt_other".to_string();
        assert!(!record.is_sentinel());
    }
}
