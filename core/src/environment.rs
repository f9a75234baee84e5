//! Sandbox environment capture.
//!
//! The process environment is read exactly once into an [`Environment`] and
//! everything else works from that value, so nothing downstream touches
//! global process state.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Variable holding the sandbox's unique id.
pub const SANDBOX_ID: &str = "SANDBOX_ID";
/// Variable holding the control-plane base URL.
pub const CONTROL_PLANE_URL: &str = "CONTROL_PLANE_URL";
/// Variable holding the sandbox's own bearer token.
pub const SANDBOX_AUTH_TOKEN: &str = "SANDBOX_AUTH_TOKEN";
/// Variable holding the repository owner.
pub const REPO_OWNER: &str = "REPO_OWNER";
/// Variable holding the repository name.
pub const REPO_NAME: &str = "REPO_NAME";

/// An immutable snapshot of environment variables.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables that are not valid unicode are skipped.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Builds an environment from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of `key`, treating empty values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns true if `key` is set to a non-empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns a copy of this environment without the given keys.
    pub fn without<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut vars = self.vars.clone();
        for key in keys {
            vars.remove(key);
        }
        Self { vars }
    }

    /// Iterates over all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// Values are never printed; the environment carries provider secrets.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Identity of the running sandbox, required before anything else starts.
#[derive(Clone, PartialEq, Eq)]
pub struct SandboxIdentity {
    /// Unique sandbox id.
    pub sandbox_id: String,
    /// Base URL of the control plane.
    pub control_plane_url: String,
    /// Bearer token the sandbox presents to the control plane.
    pub auth_token: String,
    /// Repository owner.
    pub repo_owner: String,
    /// Repository name.
    pub repo_name: String,
}

impl SandboxIdentity {
    /// Reads the identity from a captured environment.
    ///
    /// Fails with [`Error::Config`] listing every missing variable.
    pub fn from_env(env: &Environment) -> Result<Self> {
        let required = [
            SANDBOX_ID,
            CONTROL_PLANE_URL,
            SANDBOX_AUTH_TOKEN,
            REPO_OWNER,
            REPO_NAME,
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| !env.contains(key))
            .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let get = |key: &str| env.get(key).unwrap_or_default().to_string();

        Ok(Self {
            sandbox_id: get(SANDBOX_ID),
            control_plane_url: get(CONTROL_PLANE_URL).trim_end_matches('/').to_string(),
            auth_token: get(SANDBOX_AUTH_TOKEN),
            repo_owner: get(REPO_OWNER),
            repo_name: get(REPO_NAME),
        })
    }

    /// Returns `owner/name` of the sandbox's repository.
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}

impl fmt::Debug for SandboxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxIdentity")
            .field("sandbox_id", &self.sandbox_id)
            .field("control_plane_url", &self.control_plane_url)
            .field("auth_token", &"[REDACTED]")
            .field("repo_owner", &self.repo_owner)
            .field("repo_name", &self.repo_name)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_identity_env() -> Vec<(&'static str, &'static str)> {
    vec![
        (SANDBOX_ID, "test-sandbox"),
        (CONTROL_PLANE_URL, "https://cp.example.com"),
        (SANDBOX_AUTH_TOKEN, "tok"),
        (REPO_OWNER, "acme"),
        (REPO_NAME, "app"),
    ]
}
