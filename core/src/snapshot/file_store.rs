//! JSON-file backed snapshot store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::atomic::write_atomic;
use crate::error::Result;

use super::model::{Fingerprint, Snapshot, SnapshotMetadata, SnapshotStatus};
use super::store::{InsertOutcome, SnapshotStore, SnapshotTable, Transition};

/// Snapshot store persisted to a single JSON document.
///
/// Every mutation rewrites the document atomically while holding the table
/// lock, so a crash leaves either the previous or the new state on disk.
/// Like [`super::MemorySnapshotStore`], atomicity is per process.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<SnapshotTable>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing state if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let table = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => SnapshotTable::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SnapshotTable::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = ?path, "opened snapshot store");

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Returns the path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, table: &SnapshotTable) -> Result<()> {
        let json = serde_json::to_vec_pretty(table)?;
        write_atomic(&self.path, &json)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn insert_building(&self, candidate: Snapshot) -> Result<InsertOutcome> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let outcome = next.insert_building(candidate)?;
        if matches!(outcome, InsertOutcome::Created(_)) {
            self.persist(&next)?;
            *table = next;
        }
        Ok(outcome)
    }

    async fn transition(&self, from: SnapshotStatus, updated: Snapshot) -> Result<Transition> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let outcome = next.transition(from, updated)?;
        if matches!(outcome, Transition::Applied(_)) {
            self.persist(&next)?;
            *table = next;
        }
        Ok(outcome)
    }

    async fn complete_build(
        &self,
        updated: Snapshot,
        metadata: Option<SnapshotMetadata>,
    ) -> Result<Transition> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let outcome = next.complete_build(updated, metadata)?;
        if matches!(outcome, Transition::Applied(_)) {
            self.persist(&next)?;
            *table = next;
        }
        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<Snapshot>> {
        Ok(self.table.lock().await.get(id))
    }

    async fn latest_for(&self, fingerprint: &Fingerprint) -> Result<Option<Snapshot>> {
        Ok(self.table.lock().await.latest_for(fingerprint))
    }

    async fn list_for_repo(&self, owner: &str, name: &str) -> Result<Vec<Snapshot>> {
        Ok(self.table.lock().await.list_for_repo(owner, name))
    }

    async fn list_by_status(&self, status: SnapshotStatus) -> Result<Vec<Snapshot>> {
        Ok(self.table.lock().await.list_by_status(status))
    }

    async fn put_metadata(&self, metadata: SnapshotMetadata) -> Result<()> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        next.put_metadata(metadata)?;
        self.persist(&next)?;
        *table = next;
        Ok(())
    }

    async fn metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotMetadata>> {
        Ok(self.table.lock().await.metadata(snapshot_id))
    }
}
