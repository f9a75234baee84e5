//! Snapshot records and their lifecycle states.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::RepositoryConfig;

/// Lifecycle state of a snapshot.
///
/// `Building` moves once to `Ready` or `Failed`; `Ready` may later become
/// `Expired`. `Failed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// A build is in flight.
    Building,
    /// The artifact is usable.
    Ready,
    /// The build failed.
    Failed,
    /// The artifact aged out or was superseded.
    Expired,
}

impl SnapshotStatus {
    /// Returns true for states a snapshot can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SnapshotStatus::Failed | SnapshotStatus::Expired)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SnapshotStatus) -> bool {
        use SnapshotStatus::*;
        matches!(
            (self, next),
            (Building, Ready) | (Building, Failed) | (Ready, Expired)
        )
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotStatus::Building => "building",
            SnapshotStatus::Ready => "ready",
            SnapshotStatus::Failed => "failed",
            SnapshotStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// The exact source state a snapshot captures: `(owner, name, base_sha)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    pub owner: String,
    pub name: String,
    pub base_sha: String,
}

impl Fingerprint {
    /// Creates a fingerprint.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        base_sha: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            base_sha: base_sha.into(),
        }
    }

    /// Fingerprint of `repo` at `commit`.
    pub fn of(repo: &RepositoryConfig, commit: &str) -> Self {
        Self::new(&repo.owner, &repo.name, commit)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.base_sha)
    }
}

/// One build artifact of a repository at a specific commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Opaque unique id.
    pub id: String,
    /// Repository owner.
    pub repo_owner: String,
    /// Repository name.
    pub repo_name: String,
    /// Commit the snapshot was built from.
    pub base_sha: String,
    /// Current lifecycle state.
    pub status: SnapshotStatus,
    /// When the build was started.
    pub created_at: DateTime<Utc>,
    /// When a ready snapshot stops being served. `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Wall time of a successful build.
    #[serde(default)]
    pub build_duration: Option<Duration>,
    /// Builder error of a failed build.
    #[serde(default)]
    pub error_message: Option<String>,
    /// How long the snapshot stays ready once built, fixed from the recipe
    /// at creation.
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl Snapshot {
    /// Creates a new building snapshot with a fresh id.
    pub fn building(fingerprint: &Fingerprint, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo_owner: fingerprint.owner.clone(),
            repo_name: fingerprint.name.clone(),
            base_sha: fingerprint.base_sha.clone(),
            status: SnapshotStatus::Building,
            created_at: now,
            expires_at: None,
            build_duration: None,
            error_message: None,
            ttl: None,
        }
    }

    /// Sets the freshness window applied when the build succeeds.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Returns the snapshot's fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.repo_owner, &self.repo_name, &self.base_sha)
    }

    /// Returns true if the snapshot belongs to `owner/name`.
    pub fn belongs_to(&self, owner: &str, name: &str) -> bool {
        self.repo_owner == owner && self.repo_name == name
    }

    /// Returns true if this is a ready snapshot whose expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SnapshotStatus::Ready && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns true if the snapshot can be served as a cache hit at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SnapshotStatus::Ready && !self.is_expired_at(now)
    }

    pub(crate) fn into_ready(mut self, duration: Duration, expires_at: Option<DateTime<Utc>>) -> Self {
        self.status = SnapshotStatus::Ready;
        self.build_duration = Some(duration);
        self.expires_at = expires_at;
        self
    }

    pub(crate) fn into_failed(mut self, error: impl Into<String>) -> Self {
        self.status = SnapshotStatus::Failed;
        self.error_message = Some(error.into());
        self
    }

    pub(crate) fn into_expired(mut self) -> Self {
        self.status = SnapshotStatus::Expired;
        self
    }
}

/// Descriptive record stored next to a ready snapshot's artifact.
///
/// Only consulted for cache-validity heuristics, never by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub base_sha: String,
    pub base_branch: String,
    pub build_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub node_version: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
    /// npm, pnpm or yarn.
    #[serde(default)]
    pub package_manager: Option<String>,
    /// SHA-256 of the lock file.
    #[serde(default)]
    pub dependency_hash: Option<String>,
}

impl SnapshotMetadata {
    /// Returns true if dependencies installed for `other` can be reused here.
    ///
    /// Requires the same package manager and an identical, present lock hash.
    pub fn reuses_dependencies(&self, other: &SnapshotMetadata) -> bool {
        match (&self.dependency_hash, &other.dependency_hash) {
            (Some(a), Some(b)) => a == b && self.package_manager == other.package_manager,
            _ => false,
        }
    }
}

/// Result a builder reports when it finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// The artifact was produced.
    Success {
        duration: Duration,
        metadata: Option<SnapshotMetadata>,
    },
    /// The build failed.
    Failure { error: String },
}

impl BuildOutcome {
    /// Successful build without metadata.
    pub fn success(duration: Duration) -> Self {
        BuildOutcome::Success {
            duration,
            metadata: None,
        }
    }

    /// Failed build.
    pub fn failure(error: impl Into<String>) -> Self {
        BuildOutcome::Failure {
            error: error.into(),
        }
    }
}
