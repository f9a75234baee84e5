//! Warmstart CLI
//!
//! Sandbox-side entry points for credential materialization and snapshot
//! resolution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use warmstart::{
    CommandBuilder, CredentialBroker, Environment, JsonFileStore, MaterializeOutcome,
    ProviderSpec, RegistryConfig, RepositoryConfig, SnapshotRegistry, SnapshotStatus,
};

/// Default location of the snapshot store used by `resolve`.
const DEFAULT_STORE: &str = ".warmstart/snapshots.json";

/// How long `resolve` waits for a build before giving up.
const BUILD_WAIT: Duration = Duration::from_secs(60 * 60);

fn usage(program: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {} materialize [provider...]", program);
    eprintln!("  {} resolve <repo-config> <sha> <checkout-dir> [--store <path>]", program);
    eprintln!("\nEnvironment variables:");
    eprintln!("  SANDBOX_ID, CONTROL_PLANE_URL, SANDBOX_AUTH_TOKEN, REPO_OWNER, REPO_NAME");
    eprintln!("  <PROVIDER>_OAUTH_REFRESH_TOKEN, <PROVIDER>_OAUTH_ACCOUNT_ID");
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Parse args (positional, no flags beyond --store)
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("warmstart");

    let code = match args.get(1).map(String::as_str) {
        Some("materialize") => materialize(&args[2..]),
        Some("resolve") => resolve(program, &args[2..]).await,
        _ => usage(program),
    };

    std::process::exit(code);
}

fn materialize(providers: &[String]) -> i32 {
    let env = Environment::capture();

    let mut broker = match CredentialBroker::from_env(env) {
        Ok(broker) => broker,
        Err(e) => {
            eprintln!("Sandbox startup failed: {}", e);
            return 1;
        }
    };

    for name in providers {
        broker = broker.with_provider(ProviderSpec::new(name.as_str()));
    }

    let selected: Vec<ProviderSpec> = if providers.is_empty() {
        broker.providers().to_vec()
    } else {
        providers
            .iter()
            .filter_map(|name| broker.provider(name).cloned())
            .collect()
    };

    for spec in &selected {
        match broker.materialize(spec) {
            Ok(MaterializeOutcome::Written { path, .. }) => {
                println!("{}: wrote sentinel credential to {}", spec.name, path.display());
            }
            Ok(MaterializeOutcome::Skipped) => {
                println!("{}: no refresh token, skipped", spec.name);
            }
            Err(e) => {
                eprintln!("{}: {}", spec.name, broker.redactor().redact(&e.to_string()));
                return 1;
            }
        }
    }

    0
}

async fn resolve(program: &str, args: &[String]) -> i32 {
    let mut positional = Vec::new();
    let mut store_path = PathBuf::from(DEFAULT_STORE);

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--store" {
            match iter.next() {
                Some(path) => store_path = PathBuf::from(path),
                None => usage(program),
            }
        } else {
            positional.push(arg.as_str());
        }
    }

    let &[config_path, sha, checkout_dir] = positional.as_slice() else {
        usage(program);
    };

    let repo = match RepositoryConfig::load(config_path) {
        Ok(repo) => repo,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let store = match JsonFileStore::open(&store_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("failed to open snapshot store: {}", e);
            return 1;
        }
    };

    let registry = SnapshotRegistry::new(
        Arc::new(store),
        Arc::new(CommandBuilder::new(checkout_dir)),
        RegistryConfig::default(),
    );

    tracing::info!(repo = %repo.full_name(), sha = %sha, "resolving snapshot");

    let result: warmstart::Result<_> = async {
        let snapshot = registry.resolve(&repo, sha).await?;
        registry.wait_for_terminal(&snapshot.id, BUILD_WAIT).await
    }
    .await;

    match result {
        Ok(snapshot) => {
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("failed to render snapshot: {}", e),
            }
            if snapshot.status == SnapshotStatus::Ready {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Resolve failed: {}", e);
            1
        }
    }
}
