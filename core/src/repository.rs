//! Repository build recipes.
//!
//! A [`RepositoryConfig`] describes how the external builder turns a checkout
//! into a warm snapshot. It is loaded and validated once, then treated as
//! immutable.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Validate;
use crate::error::{Error, Result};

/// Longest accepted rebuild interval: one year.
pub const MAX_BUILD_INTERVAL_MINUTES: u64 = 60 * 24 * 365;

/// Build recipe for a single repository, identified by `(owner, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository owner (organisation or user).
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Branch whose head is tracked for supersession.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Commands run once after checkout, in order.
    #[serde(default)]
    pub setup_commands: Vec<String>,
    /// Commands that produce build artifacts, in order.
    #[serde(default)]
    pub build_commands: Vec<String>,
    /// Paths whose contents are kept warm in the snapshot.
    #[serde(default)]
    pub cache_paths: BTreeSet<String>,
    /// How long a ready snapshot stays fresh.
    #[serde(default = "default_build_interval_minutes")]
    pub build_interval_minutes: u64,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_build_interval_minutes() -> u64 {
    30
}

impl RepositoryConfig {
    /// Creates a config with default branch, no commands and a 30 minute interval.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            default_branch: default_branch(),
            setup_commands: Vec::new(),
            build_commands: Vec::new(),
            cache_paths: BTreeSet::new(),
            build_interval_minutes: default_build_interval_minutes(),
        }
    }

    /// Sets the tracked branch.
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Appends a setup command.
    pub fn with_setup_command(mut self, command: impl Into<String>) -> Self {
        self.setup_commands.push(command.into());
        self
    }

    /// Appends a build command.
    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_commands.push(command.into());
        self
    }

    /// Adds a cache-warm path.
    pub fn with_cache_path(mut self, path: impl Into<String>) -> Self {
        self.cache_paths.insert(path.into());
        self
    }

    /// Sets the rebuild interval in minutes.
    pub fn with_build_interval_minutes(mut self, minutes: u64) -> Self {
        self.build_interval_minutes = minutes;
        self
    }

    /// Returns the rebuild interval as a Duration.
    pub fn build_interval(&self) -> Duration {
        Duration::from_secs(self.build_interval_minutes.saturating_mul(60))
    }

    /// Returns `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Returns true if the recipe warms any cache paths.
    pub fn warms_cache(&self) -> bool {
        !self.cache_paths.is_empty()
    }

    /// Loads and validates a config from a TOML or YAML file.
    ///
    /// The format is picked from the file extension (`.yaml`/`.yml` are YAML,
    /// anything else is TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let config: RepositoryConfig = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::InvalidRepository(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                Error::InvalidRepository(format!("failed to parse {}: {}", path.display(), e))
            })?
        };

        config.validated()
    }

    /// Validates the config, logging warnings and failing on errors.
    pub fn validated(self) -> Result<Self> {
        let result = self.validate();
        if !result.is_valid() {
            return Err(Error::InvalidRepository(result.errors.join("; ")));
        }

        for warning in result.warnings {
            tracing::warn!(repo = %self.full_name(), "{}", warning);
        }

        Ok(self)
    }
}
