//! Error types for the snapshot registry and credential broker.

use std::path::PathBuf;
use thiserror::Error;

use crate::snapshot::SnapshotStatus;

/// Top-level error type for warmstart operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Required sandbox configuration is missing or invalid.
    ///
    /// Fatal at startup: the sandbox must not proceed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A repository description failed validation.
    #[error("invalid repository config: {0}")]
    InvalidRepository(String),

    /// A builder failed to produce a snapshot.
    #[error("build failed: {0}")]
    Build(String),

    /// `complete` was called on a snapshot that is no longer building.
    #[error("snapshot {id} already completed (status: {status})")]
    DoubleCompletion { id: String, status: SnapshotStatus },

    /// No snapshot with the given id exists.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Waiting for an in-flight build exceeded the caller's deadline.
    #[error("timed out waiting for snapshot {0}")]
    WaitTimeout(String),

    /// The backing snapshot store rejected an operation.
    #[error("snapshot store error: {0}")]
    Store(String),

    /// The credential file exists but cannot be merged.
    #[error("malformed credential file at {path}: {reason}")]
    CredentialFile { path: PathBuf, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for warmstart operations.
pub type Result<T> = std::result::Result<T, Error>;
