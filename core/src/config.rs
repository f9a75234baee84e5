//! Configuration validation and registry tuning.
//!
//! Records loaded from disk or the environment are validated once at the
//! boundary and passed around as plain values afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::repository::{RepositoryConfig, MAX_BUILD_INTERVAL_MINUTES};

/// Upper bound on how long any snapshot stays ready.
const MAX_SNAPSHOT_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Problems found while checking a recipe or registry settings.
///
/// Errors make the record unusable; warnings are logged at load time and the
/// record is kept.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Problems that reject the record.
    pub errors: Vec<String>,
    /// Suspicious but accepted settings.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// True when nothing rejects the record.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records a rejecting problem.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Records an accepted-but-suspicious setting.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Folds in the findings of a nested record.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Returns the warnings, or a [`Error::Config`] joining every error.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Records checked once where they enter the process.
pub trait Validate {
    /// Checks the record without modifying it.
    fn validate(&self) -> ValidationResult;
}

impl Validate for RepositoryConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.owner.trim().is_empty() {
            result.add_error("owner cannot be empty");
        }
        if self.name.trim().is_empty() {
            result.add_error("name cannot be empty");
        }
        if self.default_branch.trim().is_empty() {
            result.add_error("default_branch cannot be empty");
        }
        if self.build_interval_minutes == 0 {
            result.add_error("build_interval_minutes must be at least 1");
        }
        if self.build_interval_minutes > MAX_BUILD_INTERVAL_MINUTES {
            result.add_error(format!(
                "build_interval_minutes must not exceed {} (one year)",
                MAX_BUILD_INTERVAL_MINUTES
            ));
        }

        for (kind, commands) in [
            ("setup_commands", &self.setup_commands),
            ("build_commands", &self.build_commands),
        ] {
            if commands.iter().any(|c| c.trim().is_empty()) {
                result.add_error(format!("{} contains an empty command", kind));
            }
        }

        if self.build_commands.is_empty() {
            result.add_warning("no build_commands - snapshots will only capture the checkout");
        }

        if self.build_interval_minutes > 0 && self.build_interval_minutes < 5 {
            result.add_warning(
                "build_interval_minutes under 5 may cause near-continuous rebuilds",
            );
        }

        for path in &self.cache_paths {
            if path.starts_with('/') || path.contains("..") {
                result.add_warning(format!(
                    "cache_path '{}' points outside the repository checkout",
                    path
                ));
            }
        }

        result
    }
}

/// Tuning knobs for the snapshot registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Ready snapshots of repos with cache paths live this many build intervals.
    #[serde(default = "default_warm_cache_ttl_multiplier")]
    pub warm_cache_ttl_multiplier: u32,

    /// Period of the background expiry sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// First delay when polling an in-flight build.
    #[serde(default = "default_poll_initial")]
    pub poll_initial: Duration,

    /// Upper bound on the polling delay.
    #[serde(default = "default_poll_max")]
    pub poll_max: Duration,
}

fn default_warm_cache_ttl_multiplier() -> u32 {
    2
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_initial() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_max() -> Duration {
    Duration::from_secs(30)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warm_cache_ttl_multiplier: default_warm_cache_ttl_multiplier(),
            sweep_interval: default_sweep_interval(),
            poll_initial: default_poll_initial(),
            poll_max: default_poll_max(),
        }
    }
}

impl RegistryConfig {
    /// Sets the polling delays used while waiting on a build.
    pub fn with_poll(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_max = max;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Returns how long a freshly built snapshot of `repo` stays ready.
    ///
    /// Capped at ten years so expiry timestamps stay representable.
    pub fn ttl_for(&self, repo: &RepositoryConfig) -> Duration {
        let ttl = if repo.warms_cache() {
            repo.build_interval()
                .checked_mul(self.warm_cache_ttl_multiplier.max(1))
                .unwrap_or(Duration::MAX)
        } else {
            repo.build_interval()
        };
        ttl.min(MAX_SNAPSHOT_TTL)
    }
}

impl Validate for RegistryConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.sweep_interval.is_zero() {
            result.add_error("sweep_interval must be non-zero");
        }
        if self.poll_initial.is_zero() {
            result.add_error("poll_initial must be non-zero");
        }
        if self.poll_initial > self.poll_max {
            result.add_error("poll_initial must not exceed poll_max");
        }
        if self.warm_cache_ttl_multiplier == 0 {
            result.add_warning("warm_cache_ttl_multiplier = 0 is treated as 1");
        }

        result
    }
}
