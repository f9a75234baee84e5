//! Sentinel credential broker.
//!
//! Runs once at sandbox startup. For each provider whose real refresh token is
//! present in the environment, it writes a credential entry whose refresh
//! field is the [`SENTINEL_REFRESH`] placeholder. Tools reading the file see
//! a valid but already-expired credential; their refresh attempt is caught by
//! the auth-proxy plugin and resolved through the control plane, so the real
//! token never reaches disk.

mod control_plane;
mod credential;
mod provider;
mod redact;

pub use control_plane::{resolve_sentinel, ControlPlaneClient, ProviderToken, TokenRequest};
pub use credential::{is_sentinel, AuthRecord, CredentialEntry, CREDENTIAL_TYPE, SENTINEL_REFRESH};
pub use provider::ProviderSpec;
pub use redact::Redactor;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::atomic::write_atomic;
use crate::environment::{Environment, SandboxIdentity, SANDBOX_AUTH_TOKEN};
use crate::error::{Error, Result};

/// Tool whose credential file is written by default.
pub const DEFAULT_TOOL: &str = "opencode";

/// Returns `<home>/.local/share/<tool>/auth.json`.
pub fn credential_path(home: &Path, tool: &str) -> PathBuf {
    home.join(".local").join("share").join(tool).join("auth.json")
}

/// What [`CredentialBroker::materialize`] did for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// A sentinel entry was written.
    Written {
        path: PathBuf,
        with_account_id: bool,
    },
    /// The provider's refresh token was absent; nothing was written.
    Skipped,
}

/// Writes sentinel credentials for the sandbox.
#[derive(Debug)]
pub struct CredentialBroker {
    identity: SandboxIdentity,
    env: Environment,
    auth_path: PathBuf,
    providers: Vec<ProviderSpec>,
    redactor: Redactor,
}

impl CredentialBroker {
    /// Creates a broker writing under `home` for the built-in providers.
    pub fn new(identity: SandboxIdentity, env: Environment, home: impl AsRef<Path>) -> Self {
        let providers = ProviderSpec::builtin();
        let redactor = Self::build_redactor(&env, &providers);
        Self {
            identity,
            env,
            auth_path: credential_path(home.as_ref(), DEFAULT_TOOL),
            providers,
            redactor,
        }
    }

    /// Creates a broker from a captured environment.
    ///
    /// Fails if the sandbox identity is incomplete or `HOME` is unset.
    pub fn from_env(env: Environment) -> Result<Self> {
        let identity = SandboxIdentity::from_env(&env)?;
        let home = env
            .get("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| Error::Config("HOME is not set".to_string()))?;
        Ok(Self::new(identity, env, home))
    }

    /// Writes to `<home>/.local/share/<tool>/auth.json` instead.
    pub fn with_tool(mut self, home: impl AsRef<Path>, tool: &str) -> Self {
        self.auth_path = credential_path(home.as_ref(), tool);
        self
    }

    /// Adds a provider to the set this broker knows about.
    pub fn with_provider(mut self, spec: ProviderSpec) -> Self {
        if !self.providers.contains(&spec) {
            self.providers.push(spec);
            self.redactor = Self::build_redactor(&self.env, &self.providers);
        }
        self
    }

    /// Path of the credential file.
    pub fn auth_path(&self) -> &Path {
        &self.auth_path
    }

    /// Sandbox identity the broker was built with.
    pub fn identity(&self) -> &SandboxIdentity {
        &self.identity
    }

    /// Known providers.
    pub fn providers(&self) -> &[ProviderSpec] {
        &self.providers
    }

    /// Looks up a known provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Redactor covering every secret this broker has seen.
    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Writes the sentinel entry for `provider`, merging with existing entries.
    ///
    /// A missing refresh token is not an error: nothing is written and
    /// [`MaterializeOutcome::Skipped`] is returned. Repeating the call with the
    /// same environment produces byte-identical output.
    pub fn materialize(&self, provider: &ProviderSpec) -> Result<MaterializeOutcome> {
        let Some(entry) = CredentialEntry::from_env(provider, &self.env) else {
            tracing::debug!(provider = %provider.name, "no refresh token, skipping provider");
            return Ok(MaterializeOutcome::Skipped);
        };

        let record = entry.to_record();
        debug_assert!(record.is_sentinel());
        let record = serde_json::to_value(record)?;

        let mut entries = self.read_entries()?;
        entries.insert(entry.provider().to_string(), record);

        let json = serde_json::to_string_pretty(&Value::Object(entries))?;
        write_atomic(&self.auth_path, json.as_bytes())?;

        tracing::info!(
            provider = %entry.provider(),
            path = ?self.auth_path,
            sandbox_id = %self.identity.sandbox_id,
            with_account_id = entry.account_id().is_some(),
            "wrote sentinel credential"
        );

        Ok(MaterializeOutcome::Written {
            path: self.auth_path.clone(),
            with_account_id: entry.account_id().is_some(),
        })
    }

    /// Materializes every known provider, in order.
    pub fn materialize_all(&self) -> Result<Vec<(String, MaterializeOutcome)>> {
        self.providers
            .iter()
            .map(|p| Ok((p.name.clone(), self.materialize(p)?)))
            .collect()
    }

    /// Environment for child processes, without any provider variable the
    /// broker consumed or the sandbox's own bearer token.
    pub fn child_environment(&self) -> Environment {
        let secret_vars = self
            .providers
            .iter()
            .flat_map(|p| p.consumed_vars())
            .chain([SANDBOX_AUTH_TOKEN]);
        self.env.without(secret_vars)
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.auth_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::CredentialFile {
                path: self.auth_path.clone(),
                reason: "top-level value is not an object".to_string(),
            }),
            Err(e) => Err(Error::CredentialFile {
                path: self.auth_path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn build_redactor(env: &Environment, providers: &[ProviderSpec]) -> Redactor {
        Redactor::from_env(
            env,
            providers
                .iter()
                .flat_map(|p| p.secret_vars())
                .chain([SANDBOX_AUTH_TOKEN]),
        )
    }
}
