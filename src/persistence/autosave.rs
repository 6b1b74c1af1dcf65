// =============================================================================
// Auto-save service — throttled, digest-deduplicated, single-writer async
// persistence for the strategy process
// =============================================================================
//
// Called from the engine's bar loop. `maybe_save` throttles to the
// configured interval, hashes the serialised snapshot and skips writes when
// nothing changed, and hands the actual insert to a single background
// blocking task. A still-in-flight write makes the next request a no-op
// (drop-on-full). `force_save` is the shutdown path: it waits up to 30
// seconds for the in-flight write, then writes unconditionally.
//
// Nothing in here ever raises into the caller; every failure is logged at
// ERROR and swallowed.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::persistence::repository::StateRepository;
use crate::persistence::snapshot::SnapshotDoc;

/// Bound on how long `force_save` waits for an in-flight background write.
const FORCE_SAVE_WAIT: Duration = Duration::from_secs(30);

pub struct AutoSaveService {
    repository: Arc<StateRepository>,
    strategy_name: String,
    interval: Duration,
    cleanup_interval: Duration,
    keep_days: i64,

    last_save: Instant,
    last_cleanup: Instant,
    last_digest: Option<String>,
    pending: Option<JoinHandle<()>>,
}

impl AutoSaveService {
    pub fn new(
        repository: Arc<StateRepository>,
        strategy_name: impl Into<String>,
        interval_seconds: f64,
        cleanup_interval_hours: f64,
        keep_days: i64,
    ) -> Self {
        Self {
            repository,
            strategy_name: strategy_name.into(),
            interval: Duration::from_secs_f64(interval_seconds.max(0.0)),
            cleanup_interval: Duration::from_secs_f64(cleanup_interval_hours.max(0.0) * 3600.0),
            keep_days,
            last_save: Instant::now(),
            last_cleanup: Instant::now(),
            last_digest: None,
            pending: None,
        }
    }

    /// Save if the interval has elapsed. The snapshot closure is only called
    /// once the throttle check passes, so idle ticks cost nothing.
    pub fn maybe_save(&mut self, snapshot_fn: impl FnOnce() -> SnapshotDoc) {
        if self.last_save.elapsed() < self.interval {
            return;
        }
        self.do_save(snapshot_fn);
    }

    fn do_save(&mut self, snapshot_fn: impl FnOnce() -> SnapshotDoc) {
        let data = snapshot_fn();
        let json_str = match self.repository.serializer().serialize(&data) {
            Ok(s) => s,
            Err(e) => {
                error!(strategy = %self.strategy_name, error = %e, "auto-save serialisation failed");
                return;
            }
        };

        let digest = Self::compute_digest(&json_str);
        if self.last_digest.as_deref() == Some(digest.as_str()) {
            debug!(
                strategy = %self.strategy_name,
                digest = &digest[..8],
                "state unchanged, save skipped"
            );
            self.last_save = Instant::now();
            return;
        }

        if let Some(handle) = &self.pending {
            if !handle.is_finished() {
                debug!(
                    strategy = %self.strategy_name,
                    "previous background save still in flight, skipping this one"
                );
                return;
            }
        }

        // Cleanup runs inside the background job; the single writer owns
        // the store for the duration of its work.
        let run_cleanup = self.last_cleanup.elapsed() >= self.cleanup_interval;
        if run_cleanup {
            self.last_cleanup = Instant::now();
        }

        let repository = Arc::clone(&self.repository);
        let strategy_name = self.strategy_name.clone();
        let keep_days = self.keep_days;
        self.pending = Some(tokio::task::spawn_blocking(move || {
            if let Err(e) = repository.save_raw(&strategy_name, &json_str) {
                error!(strategy = %strategy_name, error = %e, "background save failed");
                return;
            }
            debug!(strategy = %strategy_name, "background save complete");
            if run_cleanup {
                match repository.cleanup(&strategy_name, keep_days) {
                    Ok(deleted) => {
                        info!(strategy = %strategy_name, deleted, "periodic snapshot cleanup done")
                    }
                    Err(e) => {
                        error!(strategy = %strategy_name, error = %e, "periodic cleanup failed")
                    }
                }
            }
        }));
        self.last_digest = Some(digest);
        self.last_save = Instant::now();
    }

    /// Unconditional save for shutdown: waits (bounded) for any in-flight
    /// background write, then writes synchronously, ignoring the digest.
    pub async fn force_save(&mut self, snapshot_fn: impl FnOnce() -> SnapshotDoc) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                debug!(strategy = %self.strategy_name, "waiting for in-flight save before force save");
                if tokio::time::timeout(FORCE_SAVE_WAIT, handle).await.is_err() {
                    // The write keeps running detached; it is never killed
                    // mid-transaction.
                    error!(
                        strategy = %self.strategy_name,
                        "timed out waiting for in-flight save, abandoning it"
                    );
                }
            }
        }

        let data = snapshot_fn();
        let repository = Arc::clone(&self.repository);
        let strategy_name = self.strategy_name.clone();
        let result = tokio::task::spawn_blocking(move || {
            repository
                .save(&strategy_name, &data)
                .map(|_| strategy_name)
        })
        .await;

        match result {
            Ok(Ok(strategy_name)) => info!(strategy = %strategy_name, "force save complete"),
            Ok(Err(e)) => error!(strategy = %self.strategy_name, error = %e, "force save failed"),
            Err(e) => error!(strategy = %self.strategy_name, error = %e, "force save task failed"),
        }
    }

    /// Reset the throttle timer (e.g. after a restore).
    pub fn reset(&mut self) {
        self.last_save = Instant::now();
    }

    /// Wait for any in-flight write, unbounded. Callers needing a bounded
    /// shutdown wrap this in a timeout at the outer boundary.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.pending.take() {
            let _ = handle.await;
        }
        debug!(strategy = %self.strategy_name, "auto-save service shut down");
    }

    fn compute_digest(json_str: &str) -> String {
        hex::encode(Sha256::digest(json_str.as_bytes()))
    }
}

impl std::fmt::Debug for AutoSaveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaveService")
            .field("strategy_name", &self.strategy_name)
            .field("interval", &self.interval)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::migration::MigrationChain;
    use crate::persistence::repository::{DatabaseFactory, DEFAULT_COMPRESSION_THRESHOLD};
    use crate::persistence::serializer::JsonSerializer;
    use crate::persistence::snapshot::SnapshotValue;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn setup(dir: &TempDir, interval_seconds: f64) -> (AutoSaveService, Arc<StateRepository>) {
        let factory = Arc::new(DatabaseFactory::new(dir.path().join("state.db")));
        let serializer = Arc::new(JsonSerializer::new(MigrationChain::new()));
        let repository = Arc::new(StateRepository::new(
            serializer,
            factory,
            DEFAULT_COMPRESSION_THRESHOLD,
        ));
        let service = AutoSaveService::new(
            Arc::clone(&repository),
            "alpha",
            interval_seconds,
            24.0,
            7,
        );
        (service, repository)
    }

    fn doc(marker: i64) -> SnapshotDoc {
        [("marker".to_string(), SnapshotValue::Int(marker))]
            .into_iter()
            .collect()
    }

    fn row_count(dir: &TempDir) -> i64 {
        let conn = Connection::open(dir.path().join("state.db")).unwrap();
        conn.query_row("SELECT COUNT(*) FROM strategy_state", [], |row| row.get(0))
            .unwrap()
    }

    async fn drain(service: &mut AutoSaveService) {
        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identical_snapshots_write_once() {
        let dir = TempDir::new().unwrap();
        let (mut service, _repo) = setup(&dir, 0.0);

        service.maybe_save(|| doc(1));
        drain(&mut service).await;
        service.maybe_save(|| doc(1));
        drain(&mut service).await;

        assert_eq!(row_count(&dir), 1, "digest dedup must skip the second save");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changed_snapshots_write_again() {
        let dir = TempDir::new().unwrap();
        let (mut service, _repo) = setup(&dir, 0.0);

        service.maybe_save(|| doc(1));
        drain(&mut service).await;
        service.maybe_save(|| doc(2));
        drain(&mut service).await;

        assert_eq!(row_count(&dir), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn throttle_skips_until_interval_elapses() {
        let dir = TempDir::new().unwrap();
        let (mut service, _repo) = setup(&dir, 3600.0);
        service.reset();

        // Interval has not elapsed: the closure must not even run.
        service.maybe_save(|| unreachable!("snapshot_fn must not be called while throttled"));
        assert_eq!(row_count(&dir), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn force_save_ignores_digest_and_interval() {
        let dir = TempDir::new().unwrap();
        let (mut service, _repo) = setup(&dir, 3600.0);

        service.force_save(|| doc(1)).await;
        service.force_save(|| doc(1)).await;

        assert_eq!(row_count(&dir), 2, "force save is unconditional");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn force_save_lands_after_pending_write() {
        let dir = TempDir::new().unwrap();
        let (mut service, repo) = setup(&dir, 0.0);

        service.maybe_save(|| doc(1));
        service.force_save(|| doc(2)).await;

        // Whatever interleaving happened, the final state reflects the
        // force-saved snapshot.
        let loaded = repo.load("alpha").unwrap();
        assert_eq!(loaded.get("marker"), Some(&SnapshotValue::Int(2)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serialisation_failure_never_panics_the_caller() {
        let dir = TempDir::new().unwrap();
        let (mut service, _repo) = setup(&dir, 0.0);

        // NaN is rejected by the serializer; the service logs and moves on.
        service.maybe_save(|| {
            [("bad".to_string(), SnapshotValue::Float(f64::NAN))]
                .into_iter()
                .collect()
        });
        drain(&mut service).await;
        assert_eq!(row_count(&dir), 0);
    }
}
