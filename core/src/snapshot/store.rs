//! Snapshot storage.
//!
//! The [`SnapshotStore`] trait is the registry's only view of persisted
//! state. Implementations must make [`SnapshotStore::insert_building`] and
//! [`SnapshotStore::transition`] atomic, since those two calls are what keep
//! at most one build in flight per fingerprint.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::model::{Fingerprint, Snapshot, SnapshotMetadata, SnapshotStatus};

/// Result of an atomic create-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The candidate was stored.
    Created(Snapshot),
    /// Another building snapshot already held the fingerprint.
    Existing(Snapshot),
}

impl InsertOutcome {
    /// Returns the snapshot that now holds the fingerprint.
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            InsertOutcome::Created(s) | InsertOutcome::Existing(s) => s,
        }
    }
}

/// Result of a compare-and-swap status change.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The update was stored.
    Applied(Snapshot),
    /// The stored snapshot was not in the expected state; it is returned unchanged.
    Conflict(Snapshot),
}

/// Backing store for snapshot records.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores `candidate` unless a building snapshot already exists for its
    /// fingerprint, in which case that one is returned.
    async fn insert_building(&self, candidate: Snapshot) -> Result<InsertOutcome>;

    /// Replaces the snapshot with `updated.id` if it is currently in `from`.
    async fn transition(&self, from: SnapshotStatus, updated: Snapshot) -> Result<Transition>;

    /// Moves a building snapshot to its terminal state, storing `metadata`
    /// in the same step so a ready snapshot is never observed without it.
    async fn complete_build(
        &self,
        updated: Snapshot,
        metadata: Option<SnapshotMetadata>,
    ) -> Result<Transition>;

    /// Looks up a snapshot by id.
    async fn get(&self, id: &str) -> Result<Option<Snapshot>>;

    /// Returns the newest non-failed snapshot for a fingerprint.
    async fn latest_for(&self, fingerprint: &Fingerprint) -> Result<Option<Snapshot>>;

    /// Returns every snapshot of a repository, oldest first.
    async fn list_for_repo(&self, owner: &str, name: &str) -> Result<Vec<Snapshot>>;

    /// Returns every snapshot in `status`, oldest first.
    async fn list_by_status(&self, status: SnapshotStatus) -> Result<Vec<Snapshot>>;

    /// Stores metadata for a ready snapshot. Written once.
    async fn put_metadata(&self, metadata: SnapshotMetadata) -> Result<()>;

    /// Returns metadata for a snapshot, if any was recorded.
    async fn metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotMetadata>>;
}

/// Plain in-memory table shared by the store implementations.
///
/// Snapshots are kept in insertion order, so "newest" means "last inserted".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SnapshotTable {
    snapshots: Vec<Snapshot>,
    #[serde(default)]
    metadata: HashMap<String, SnapshotMetadata>,
}

impl SnapshotTable {
    pub(crate) fn insert_building(&mut self, candidate: Snapshot) -> Result<InsertOutcome> {
        if candidate.status != SnapshotStatus::Building {
            return Err(Error::Store(format!(
                "refusing to insert snapshot {} in status {}",
                candidate.id, candidate.status
            )));
        }
        if self.snapshots.iter().any(|s| s.id == candidate.id) {
            return Err(Error::Store(format!("duplicate snapshot id {}", candidate.id)));
        }

        let fingerprint = candidate.fingerprint();
        if let Some(existing) = self
            .snapshots
            .iter()
            .find(|s| s.status == SnapshotStatus::Building && s.fingerprint() == fingerprint)
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        self.snapshots.push(candidate.clone());
        Ok(InsertOutcome::Created(candidate))
    }

    pub(crate) fn transition(
        &mut self,
        from: SnapshotStatus,
        updated: Snapshot,
    ) -> Result<Transition> {
        let slot = self
            .snapshots
            .iter_mut()
            .find(|s| s.id == updated.id)
            .ok_or_else(|| Error::SnapshotNotFound(updated.id.clone()))?;

        if slot.status != from {
            return Ok(Transition::Conflict(slot.clone()));
        }
        if !from.can_transition_to(updated.status) {
            return Err(Error::Store(format!(
                "illegal transition {} -> {} for snapshot {}",
                from, updated.status, updated.id
            )));
        }
        if slot.fingerprint() != updated.fingerprint() {
            return Err(Error::Store(format!(
                "snapshot {} cannot change fingerprint",
                updated.id
            )));
        }

        *slot = updated.clone();
        Ok(Transition::Applied(updated))
    }

    pub(crate) fn complete_build(
        &mut self,
        updated: Snapshot,
        metadata: Option<SnapshotMetadata>,
    ) -> Result<Transition> {
        let current = self
            .get(&updated.id)
            .ok_or_else(|| Error::SnapshotNotFound(updated.id.clone()))?;
        if current.status != SnapshotStatus::Building {
            return Ok(Transition::Conflict(current));
        }

        if let Some(metadata) = &metadata {
            if metadata.snapshot_id != updated.id {
                return Err(Error::Store(format!(
                    "metadata for snapshot {} attached to {}",
                    metadata.snapshot_id, updated.id
                )));
            }
            if updated.status != SnapshotStatus::Ready {
                return Err(Error::Store(format!(
                    "metadata only accompanies a ready snapshot, not {}",
                    updated.status
                )));
            }
            if self.metadata.contains_key(&updated.id) {
                return Err(Error::Store(format!(
                    "metadata for snapshot {} already recorded",
                    updated.id
                )));
            }
        }

        let outcome = self.transition(SnapshotStatus::Building, updated)?;
        if let Some(metadata) = metadata {
            self.metadata.insert(metadata.snapshot_id.clone(), metadata);
        }
        Ok(outcome)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Snapshot> {
        self.snapshots.iter().find(|s| s.id == id).cloned()
    }

    pub(crate) fn latest_for(&self, fingerprint: &Fingerprint) -> Option<Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.status != SnapshotStatus::Failed && &s.fingerprint() == fingerprint)
            .cloned()
    }

    pub(crate) fn list_for_repo(&self, owner: &str, name: &str) -> Vec<Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.belongs_to(owner, name))
            .cloned()
            .collect()
    }

    pub(crate) fn list_by_status(&self, status: SnapshotStatus) -> Vec<Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect()
    }

    pub(crate) fn put_metadata(&mut self, metadata: SnapshotMetadata) -> Result<()> {
        if self.get(&metadata.snapshot_id).is_none() {
            return Err(Error::SnapshotNotFound(metadata.snapshot_id));
        }
        if self.metadata.contains_key(&metadata.snapshot_id) {
            return Err(Error::Store(format!(
                "metadata for snapshot {} already recorded",
                metadata.snapshot_id
            )));
        }
        self.metadata.insert(metadata.snapshot_id.clone(), metadata);
        Ok(())
    }

    pub(crate) fn metadata(&self, snapshot_id: &str) -> Option<SnapshotMetadata> {
        self.metadata.get(snapshot_id).cloned()
    }
}

/// Process-local snapshot store.
///
/// Atomicity comes from a single lock around the table, so this store only
/// upholds the one-build-per-fingerprint rule within one process.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    table: RwLock<SnapshotTable>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn insert_building(&self, candidate: Snapshot) -> Result<InsertOutcome> {
        self.table.write().await.insert_building(candidate)
    }

    async fn transition(&self, from: SnapshotStatus, updated: Snapshot) -> Result<Transition> {
        self.table.write().await.transition(from, updated)
    }

    async fn complete_build(
        &self,
        updated: Snapshot,
        metadata: Option<SnapshotMetadata>,
    ) -> Result<Transition> {
        self.table.write().await.complete_build(updated, metadata)
    }

    async fn get(&self, id: &str) -> Result<Option<Snapshot>> {
        Ok(self.table.read().await.get(id))
    }

    async fn latest_for(&self, fingerprint: &Fingerprint) -> Result<Option<Snapshot>> {
        Ok(self.table.read().await.latest_for(fingerprint))
    }

    async fn list_for_repo(&self, owner: &str, name: &str) -> Result<Vec<Snapshot>> {
        Ok(self.table.read().await.list_for_repo(owner, name))
    }

    async fn list_by_status(&self, status: SnapshotStatus) -> Result<Vec<Snapshot>> {
        Ok(self.table.read().await.list_by_status(status))
    }

    async fn put_metadata(&self, metadata: SnapshotMetadata) -> Result<()> {
        self.table.write().await.put_metadata(metadata)
    }

    async fn metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotMetadata>> {
        Ok(self.table.read().await.metadata(snapshot_id))
    }
}
