//! Warmstart - snapshot registry and sentinel credential broker for sandboxes
//!
//! This library keeps sandbox cold starts cheap by reusing repository build
//! snapshots while they are fresh, and keeps long-lived provider secrets off
//! sandbox disks by writing sentinel credentials that are resolved through
//! the control plane on first use.

pub mod atomic;
pub mod backoff;
pub mod broker;
pub mod config;
pub mod environment;
pub mod error;
pub mod repository;
pub mod snapshot;

pub use error::{Error, Result};

pub use broker::{
    is_sentinel, resolve_sentinel, AuthRecord, ControlPlaneClient, CredentialBroker,
    CredentialEntry, MaterializeOutcome, ProviderSpec, ProviderToken, Redactor, TokenRequest,
    SENTINEL_REFRESH,
};
pub use config::{RegistryConfig, Validate, ValidationResult};
pub use environment::{Environment, SandboxIdentity};
pub use repository::RepositoryConfig;
pub use snapshot::{
    BuildOutcome, CommandBuilder, Fingerprint, InsertOutcome, JsonFileStore, MemorySnapshotStore,
    Snapshot, SnapshotBuilder, SnapshotMetadata, SnapshotRegistry, SnapshotStatus, SnapshotStore,
    Transition,
};
