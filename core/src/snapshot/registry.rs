//! Snapshot registry: decides reuse versus rebuild per fingerprint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::backoff::ExponentialBackoff;
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::repository::RepositoryConfig;

use super::builder::SnapshotBuilder;
use super::model::{BuildOutcome, Fingerprint, Snapshot, SnapshotMetadata, SnapshotStatus};
use super::store::{InsertOutcome, SnapshotStore, Transition};

/// Shared registry handle. Cloning is cheap and all clones see the same state.
#[derive(Clone)]
pub struct SnapshotRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn SnapshotStore>,
    builder: Arc<dyn SnapshotBuilder>,
    config: RegistryConfig,
}

impl SnapshotRegistry {
    /// Creates a registry over `store`, launching builds with `builder`.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        builder: Arc<dyn SnapshotBuilder>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                builder,
                config,
            }),
        }
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Returns a usable snapshot for `repo` at `commit`.
    ///
    /// A fresh ready snapshot is returned as-is. An in-flight build is returned
    /// so the caller can wait on it. Otherwise a new building snapshot is
    /// created and its build started in the background.
    pub async fn resolve(&self, repo: &RepositoryConfig, commit: &str) -> Result<Snapshot> {
        self.resolve_at(repo, commit, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) with an explicit clock reading.
    pub async fn resolve_at(
        &self,
        repo: &RepositoryConfig,
        commit: &str,
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let fingerprint = Fingerprint::of(repo, commit);

        if let Some(existing) = self.inner.store.latest_for(&fingerprint).await? {
            match existing.status {
                SnapshotStatus::Ready if existing.is_usable_at(now) => {
                    tracing::debug!(
                        snapshot_id = %existing.id,
                        fingerprint = %fingerprint,
                        "snapshot cache hit"
                    );
                    return Ok(existing);
                }
                SnapshotStatus::Ready => {
                    self.expire(existing).await?;
                }
                SnapshotStatus::Building => {
                    tracing::debug!(
                        snapshot_id = %existing.id,
                        fingerprint = %fingerprint,
                        "build already in flight"
                    );
                    return Ok(existing);
                }
                SnapshotStatus::Failed | SnapshotStatus::Expired => {}
            }
        }

        let candidate =
            Snapshot::building(&fingerprint, now).with_ttl(self.inner.config.ttl_for(repo));
        match self.inner.store.insert_building(candidate).await? {
            InsertOutcome::Existing(winner) => {
                tracing::debug!(
                    snapshot_id = %winner.id,
                    fingerprint = %fingerprint,
                    "lost build race, using winner"
                );
                Ok(winner)
            }
            InsertOutcome::Created(snapshot) => {
                tracing::info!(
                    snapshot_id = %snapshot.id,
                    fingerprint = %fingerprint,
                    builder = %self.inner.builder.name(),
                    "snapshot cache miss, starting build"
                );
                self.launch_build(repo.clone(), snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    /// Records a builder's result for a building snapshot.
    ///
    /// Fails with [`Error::DoubleCompletion`] if the snapshot already left
    /// `Building`; the stored record is left untouched.
    pub async fn complete(&self, snapshot_id: &str, outcome: BuildOutcome) -> Result<Snapshot> {
        self.complete_at(snapshot_id, outcome, Utc::now()).await
    }

    /// [`complete`](Self::complete) with an explicit clock reading.
    pub async fn complete_at(
        &self,
        snapshot_id: &str,
        outcome: BuildOutcome,
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let current = self
            .inner
            .store
            .get(snapshot_id)
            .await?
            .ok_or_else(|| Error::SnapshotNotFound(snapshot_id.to_string()))?;

        if current.status != SnapshotStatus::Building {
            tracing::warn!(
                snapshot_id = %snapshot_id,
                status = %current.status,
                "rejecting duplicate build completion"
            );
            return Err(Error::DoubleCompletion {
                id: snapshot_id.to_string(),
                status: current.status,
            });
        }

        let (updated, metadata) = match outcome {
            BuildOutcome::Success { duration, metadata } => {
                let ttl = self.ttl_for(&current);
                let expires_at = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| now.checked_add_signed(ttl));
                let metadata = metadata.map(|mut metadata| {
                    metadata.snapshot_id = current.id.clone();
                    metadata
                });
                (current.into_ready(duration, expires_at), metadata)
            }
            BuildOutcome::Failure { error } => (current.into_failed(error), None),
        };

        match self.inner.store.complete_build(updated, metadata).await? {
            Transition::Applied(snapshot) => {
                match snapshot.status {
                    SnapshotStatus::Ready => tracing::info!(
                        snapshot_id = %snapshot.id,
                        fingerprint = %snapshot.fingerprint(),
                        duration_secs = snapshot.build_duration.map(|d| d.as_secs_f64()),
                        expires_at = ?snapshot.expires_at,
                        "snapshot ready"
                    ),
                    _ => tracing::warn!(
                        snapshot_id = %snapshot.id,
                        fingerprint = %snapshot.fingerprint(),
                        error = snapshot.error_message.as_deref().unwrap_or_default(),
                        "snapshot build failed"
                    ),
                }
                Ok(snapshot)
            }
            Transition::Conflict(stored) => {
                tracing::warn!(
                    snapshot_id = %snapshot_id,
                    status = %stored.status,
                    "rejecting concurrent build completion"
                );
                Err(Error::DoubleCompletion {
                    id: snapshot_id.to_string(),
                    status: stored.status,
                })
            }
        }
    }

    /// Moves every ready snapshot past its expiry to `Expired`.
    ///
    /// Idempotent; returns the snapshots this call expired.
    pub async fn expire_stale(&self) -> Result<Vec<Snapshot>> {
        self.expire_stale_at(Utc::now()).await
    }

    /// [`expire_stale`](Self::expire_stale) with an explicit clock reading.
    pub async fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<Vec<Snapshot>> {
        let mut expired = Vec::new();
        for snapshot in self.inner.store.list_by_status(SnapshotStatus::Ready).await? {
            if snapshot.is_expired_at(now) {
                if let Some(done) = self.expire(snapshot).await? {
                    expired.push(done);
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired stale snapshots");
        }
        Ok(expired)
    }

    /// Expires ready snapshots of `repo` not built from `head_sha`.
    ///
    /// Called when the tracked branch moves; returns the snapshots expired.
    pub async fn supersede(&self, repo: &RepositoryConfig, head_sha: &str) -> Result<Vec<Snapshot>> {
        let mut expired = Vec::new();
        for snapshot in self.inner.store.list_for_repo(&repo.owner, &repo.name).await? {
            if snapshot.status == SnapshotStatus::Ready && snapshot.base_sha != head_sha {
                if let Some(done) = self.expire(snapshot).await? {
                    expired.push(done);
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(
                repo = %repo.full_name(),
                branch = %repo.default_branch,
                head = %head_sha,
                count = expired.len(),
                "superseded snapshots"
            );
        }
        Ok(expired)
    }

    /// Polls until `snapshot_id` leaves `Building` or `timeout` elapses.
    pub async fn wait_for_terminal(&self, snapshot_id: &str, timeout: Duration) -> Result<Snapshot> {
        let deadline = Instant::now() + timeout;
        let mut backoff =
            ExponentialBackoff::new(self.inner.config.poll_initial, self.inner.config.poll_max);

        loop {
            let snapshot = self
                .inner
                .store
                .get(snapshot_id)
                .await?
                .ok_or_else(|| Error::SnapshotNotFound(snapshot_id.to_string()))?;

            if snapshot.status != SnapshotStatus::Building {
                return Ok(snapshot);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::WaitTimeout(snapshot_id.to_string()));
            }
            tokio::time::sleep(backoff.next_delay().min(remaining)).await;
        }
    }

    /// Looks up a snapshot by id.
    pub async fn get(&self, snapshot_id: &str) -> Result<Option<Snapshot>> {
        self.inner.store.get(snapshot_id).await
    }

    /// Returns the metadata recorded for a ready snapshot.
    pub async fn metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotMetadata>> {
        self.inner.store.metadata(snapshot_id).await
    }

    /// Starts a background task running [`expire_stale`](Self::expire_stale)
    /// every `sweep_interval`.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let period = self.inner.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.expire_stale().await {
                    tracing::error!(error = %e, "snapshot expiry sweep failed");
                }
            }
        })
    }

    fn ttl_for(&self, snapshot: &Snapshot) -> Duration {
        match snapshot.ttl {
            Some(ttl) => ttl,
            None => {
                tracing::warn!(
                    snapshot_id = %snapshot.id,
                    "snapshot carries no ttl, using default build interval"
                );
                let fallback = RepositoryConfig::new(&snapshot.repo_owner, &snapshot.repo_name);
                self.inner.config.ttl_for(&fallback)
            }
        }
    }

    /// Transitions a ready snapshot to expired. `None` if another caller got there first.
    async fn expire(&self, snapshot: Snapshot) -> Result<Option<Snapshot>> {
        let id = snapshot.id.clone();
        match self
            .inner
            .store
            .transition(SnapshotStatus::Ready, snapshot.into_expired())
            .await?
        {
            Transition::Applied(expired) => {
                tracing::info!(
                    snapshot_id = %expired.id,
                    fingerprint = %expired.fingerprint(),
                    "snapshot expired"
                );
                Ok(Some(expired))
            }
            Transition::Conflict(stored) => {
                tracing::debug!(snapshot_id = %id, status = %stored.status, "snapshot already moved on");
                Ok(None)
            }
        }
    }

    fn launch_build(&self, repo: RepositoryConfig, snapshot: Snapshot) {
        let registry = self.clone();
        let span = tracing::info_span!("snapshot_build", snapshot_id = %snapshot.id);

        tokio::spawn(
            async move {
                let builder = Arc::clone(&registry.inner.builder);
                let id = snapshot.id.clone();

                // A panicking builder must still leave the snapshot terminal.
                let build = tokio::spawn(async move { builder.build(&repo, &snapshot).await });
                let outcome = match build.await {
                    Ok(outcome) => outcome,
                    Err(e) => BuildOutcome::failure(format!("builder task aborted: {}", e)),
                };

                if let Err(e) = registry.complete(&id, outcome).await {
                    tracing::warn!(error = %e, "could not record build outcome");
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MemorySnapshotStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Builder that blocks until released, then reports a fixed outcome.
    struct GatedBuilder {
        calls: AtomicUsize,
        gate: Notify,
        outcome: BuildOutcome,
    }

    impl GatedBuilder {
        fn new(outcome: BuildOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                outcome,
            })
        }
    }

    #[async_trait]
    impl SnapshotBuilder for GatedBuilder {
        async fn build(&self, _repo: &RepositoryConfig, _snapshot: &Snapshot) -> BuildOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.outcome.clone()
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn repo() -> RepositoryConfig {
        RepositoryConfig::new("acme", "app").with_build_interval_minutes(10)
    }

    fn registry(builder: Arc<GatedBuilder>) -> SnapshotRegistry {
        SnapshotRegistry::new(
            Arc::new(MemorySnapshotStore::new()),
            builder,
            RegistryConfig::default()
                .with_poll(Duration::from_millis(5), Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn miss_then_complete_then_hit() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(1)));
        let registry = registry(builder.clone());

        let building = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        assert_eq!(building.status, SnapshotStatus::Building);

        let ready = registry
            .complete_at(
                &building.id,
                BuildOutcome::success(Duration::from_secs_f64(12.3)),
                at(10),
            )
            .await
            .unwrap();
        assert_eq!(ready.status, SnapshotStatus::Ready);
        assert_eq!(ready.build_duration, Some(Duration::from_secs_f64(12.3)));
        assert_eq!(ready.expires_at, Some(at(10 + 600)));

        let hit = registry.resolve_at(&repo(), "abc123", at(20)).await.unwrap();
        assert_eq!(hit, ready);
    }

    #[tokio::test]
    async fn building_snapshot_is_shared() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(1)));
        let registry = registry(builder.clone());

        let first = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        let second = registry.resolve_at(&repo(), "abc123", at(1)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, SnapshotStatus::Building);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_start_one_build() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(1)));
        let registry = registry(builder.clone());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.resolve(&repo(), "abc123").await.unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().id);
        }
        assert_eq!(ids.len(), 1);

        // let the single spawned build reach the gate
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_completion_is_rejected_without_mutation() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(1)));
        let registry = registry(builder);

        let snapshot = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        let ready = registry
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::from_secs(2)), at(5))
            .await
            .unwrap();

        let err = registry
            .complete_at(&snapshot.id, BuildOutcome::failure("late"), at(6))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DoubleCompletion { status: SnapshotStatus::Ready, .. }
        ));

        let stored = registry.get(&snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored, ready);
    }

    #[tokio::test]
    async fn complete_unknown_snapshot_is_not_found() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));
        assert!(matches!(
            registry.complete("nope", BuildOutcome::success(Duration::ZERO)).await,
            Err(Error::SnapshotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_build_is_retried_with_new_snapshot() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let first = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        let failed = registry
            .complete_at(&first.id, BuildOutcome::failure("npm ci exited 1"), at(1))
            .await
            .unwrap();
        assert_eq!(failed.status, SnapshotStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("npm ci exited 1"));
        assert_eq!(failed.build_duration, None);

        let retry = registry.resolve_at(&repo(), "abc123", at(2)).await.unwrap();
        assert_ne!(retry.id, first.id);
        assert_eq!(retry.status, SnapshotStatus::Building);
    }

    #[tokio::test]
    async fn expired_snapshot_is_never_a_hit() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let first = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        registry
            .complete_at(&first.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();

        let next = registry.resolve_at(&repo(), "abc123", at(600)).await.unwrap();
        assert_ne!(next.id, first.id);
        assert_eq!(next.status, SnapshotStatus::Building);

        let old = registry.get(&first.id).await.unwrap().unwrap();
        assert_eq!(old.status, SnapshotStatus::Expired);
    }

    #[tokio::test]
    async fn expire_stale_is_idempotent() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let snapshot = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        registry
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();

        assert!(registry.expire_stale_at(at(599)).await.unwrap().is_empty());

        let swept = registry.expire_stale_at(at(601)).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, SnapshotStatus::Expired);

        assert!(registry.expire_stale_at(at(700)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn warm_cache_repo_gets_longer_ttl() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));
        let warm = repo().with_cache_path("node_modules");

        let snapshot = registry.resolve_at(&warm, "abc123", at(0)).await.unwrap();
        let ready = registry
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();

        assert_eq!(ready.expires_at, Some(at(1200)));
    }

    #[tokio::test]
    async fn completion_on_another_worker_uses_recipe_ttl() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
        let config = RegistryConfig::default();
        let resolver = SnapshotRegistry::new(
            store.clone(),
            GatedBuilder::new(BuildOutcome::success(Duration::ZERO)),
            config.clone(),
        );
        let completer = SnapshotRegistry::new(
            store,
            GatedBuilder::new(BuildOutcome::success(Duration::ZERO)),
            config,
        );
        let warm = repo().with_cache_path("node_modules");

        let snapshot = resolver.resolve_at(&warm, "abc123", at(0)).await.unwrap();
        assert_eq!(snapshot.ttl, Some(Duration::from_secs(1200)));

        let ready = completer
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();
        assert_eq!(ready.expires_at, Some(at(1200)));
    }

    #[tokio::test]
    async fn ttl_is_fixed_when_build_starts() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let snapshot = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();
        // a later recipe change does not alter the in-flight build
        let changed = repo().with_build_interval_minutes(60);
        registry.resolve_at(&changed, "def456", at(0)).await.unwrap();

        let ready = registry
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();
        assert_eq!(ready.expires_at, Some(at(600)));
    }

    #[tokio::test]
    async fn huge_build_interval_still_completes() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(1)));
        let registry = registry(builder.clone());
        let huge = RepositoryConfig::new("acme", "app")
            .with_build_interval_minutes(300_000_000_000_000_000)
            .with_cache_path("node_modules");

        let snapshot = registry.resolve(&huge, "abc123").await.unwrap();
        builder.gate.notify_one();

        let done = registry
            .wait_for_terminal(&snapshot.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.status, SnapshotStatus::Ready);
        assert!(done.expires_at.is_some());
    }

    #[tokio::test]
    async fn supersede_expires_other_commits_only() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let old = registry.resolve_at(&repo(), "old", at(0)).await.unwrap();
        registry
            .complete_at(&old.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();
        let head = registry.resolve_at(&repo(), "head", at(0)).await.unwrap();
        registry
            .complete_at(&head.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();

        let expired = registry.supersede(&repo(), "head").await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);

        let hit = registry.resolve_at(&repo(), "head", at(1)).await.unwrap();
        assert_eq!(hit.id, head.id);
    }

    #[tokio::test]
    async fn supersede_at_head_expires_nothing() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));

        let head = registry.resolve_at(&repo(), "head", at(0)).await.unwrap();
        registry
            .complete_at(&head.id, BuildOutcome::success(Duration::ZERO), at(0))
            .await
            .unwrap();

        assert!(registry.supersede(&repo(), "head").await.unwrap().is_empty());
        assert!(registry.supersede(&repo(), "head").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_build_completes_snapshot() {
        let builder = GatedBuilder::new(BuildOutcome::success(Duration::from_secs(4)));
        let registry = registry(builder.clone());

        let snapshot = registry.resolve(&repo(), "abc123").await.unwrap();
        builder.gate.notify_one();

        let done = registry
            .wait_for_terminal(&snapshot.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.status, SnapshotStatus::Ready);
        assert_eq!(done.build_duration, Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn wait_for_terminal_times_out() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));
        let snapshot = registry.resolve(&repo(), "abc123").await.unwrap();

        let err = registry
            .wait_for_terminal(&snapshot.id, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout(_)));
    }

    #[tokio::test]
    async fn metadata_is_attached_on_success() {
        let registry = registry(GatedBuilder::new(BuildOutcome::success(Duration::ZERO)));
        let snapshot = registry.resolve_at(&repo(), "abc123", at(0)).await.unwrap();

        let metadata = SnapshotMetadata {
            snapshot_id: "placeholder".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "app".to_string(),
            base_sha: "abc123".to_string(),
            base_branch: "main".to_string(),
            build_timestamp: at(0),
            node_version: None,
            python_version: Some("3.12.1".to_string()),
            package_manager: None,
            dependency_hash: None,
        };
        registry
            .complete_at(
                &snapshot.id,
                BuildOutcome::Success {
                    duration: Duration::ZERO,
                    metadata: Some(metadata),
                },
                at(0),
            )
            .await
            .unwrap();

        let stored = registry.metadata(&snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.snapshot_id, snapshot.id);
        assert_eq!(stored.python_version.as_deref(), Some("3.12.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_expires_on_schedule() {
        let store = Arc::new(MemorySnapshotStore::new());
        let registry = SnapshotRegistry::new(
            store.clone(),
            GatedBuilder::new(BuildOutcome::success(Duration::ZERO)),
            RegistryConfig::default().with_sweep_interval(Duration::from_secs(60)),
        );

        let past = Utc::now() - chrono::Duration::hours(2);
        let snapshot = registry.resolve_at(&repo(), "abc123", past).await.unwrap();
        registry
            .complete_at(&snapshot.id, BuildOutcome::success(Duration::ZERO), past)
            .await
            .unwrap();

        let handle = registry.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.abort();

        let stored = store.get(&snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SnapshotStatus::Expired);
    }
}
