//! Snapshot registry for warm sandbox starts.
//!
//! A snapshot is one build artifact of a repository at a commit. The
//! [`SnapshotRegistry`] decides whether an existing snapshot can be reused or
//! a new one must be built, and guarantees at most one build per
//! [`Fingerprint`] is in flight at a time.

mod builder;
mod file_store;
mod model;
mod registry;
mod store;

pub use builder::{detect_lock_file, hash_file, CommandBuilder, SnapshotBuilder, LOCK_FILES};
pub use file_store::JsonFileStore;
pub use model::{BuildOutcome, Fingerprint, Snapshot, SnapshotMetadata, SnapshotStatus};
pub use registry::SnapshotRegistry;
pub use store::{InsertOutcome, MemorySnapshotStore, SnapshotStore, Transition};
