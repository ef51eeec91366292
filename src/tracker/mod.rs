//! Execution tracker -- owns one job's lifecycle from submission to a
//! terminal status.
//!
//! The tracker polls `GET /execution-status/{id}` on a fixed cadence,
//! merges each payload into its record under the monotonic-status rule,
//! and on the first terminal observation performs exactly one best-effort
//! detailed-metrics fetch before handing the finalized record to the
//! result store. Polls are strictly sequential (each tick awaits its
//! response before the next fires), so overlapping in-flight requests
//! cannot occur; a stale payload that slips through anyway is discarded
//! by the rank guard in `ExecutionRecord::merge_from`.

use crate::backend::BackendClient;
use crate::model::{ExecutionRecord, ExecutionStatus, TestProvenance};
use crate::store::ResultStore;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a single poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Job still in flight; keep polling.
    Pending,
    /// Terminal status observed (or poll failure mapped to `error`);
    /// the loop must stop.
    Terminal,
}

/// Client-side state machine for one tracked execution.
pub struct ExecutionTracker {
    client: Arc<BackendClient>,
    record: ExecutionRecord,
    stopped: bool,
}

impl ExecutionTracker {
    pub fn new(client: Arc<BackendClient>, execution_id: &str) -> Self {
        Self {
            client,
            record: ExecutionRecord::new(execution_id),
            stopped: false,
        }
    }

    /// The record as of the last applied poll.
    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    pub fn is_terminal(&self) -> bool {
        self.record.status.is_terminal()
    }

    /// Stop polling without touching the record. The remote job keeps
    /// running; no cancellation is sent.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped || self.is_terminal()
    }

    /// Issue one status poll and fold the response into the record.
    ///
    /// A transport or HTTP failure is terminal for the loop: the record
    /// maps to `error` and no automatic retry happens. The explicit
    /// `results refresh` path is the manual retry.
    pub async fn tick(&mut self) -> Tick {
        if self.is_stopped() {
            return Tick::Terminal;
        }

        let id = self.record.execution_id.clone();
        match self.client.execution_status(&id).await {
            Ok(payload) => {
                let before = self.record.status;
                self.record.merge_from(&payload.into_record(&id));
                if self.record.status != before {
                    info!(execution_id = %id, from = %before, to = %self.record.status, "Status changed");
                }
                if self.is_terminal() {
                    self.stopped = true;
                    Tick::Terminal
                } else {
                    Tick::Pending
                }
            }
            Err(e) => {
                warn!(execution_id = %id, "Status poll failed: {}", e);
                self.record.apply_status(ExecutionStatus::Error);
                self.stopped = true;
                Tick::Terminal
            }
        }
    }
}

/// At-most-one active poll loop per execution id.
///
/// A second `acquire` for an id whose loop is still alive is rejected
/// rather than replacing it; the slot frees itself when the guard drops.
#[derive(Clone, Default)]
pub struct TrackerRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, execution_id: &str) -> Result<TrackerGuard> {
        let mut active = self.active.lock().expect("registry lock poisoned");
        if !active.insert(execution_id.to_string()) {
            anyhow::bail!("A tracker is already active for execution '{}'", execution_id);
        }
        Ok(TrackerGuard {
            execution_id: execution_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, execution_id: &str) -> bool {
        self.active
            .lock()
            .expect("registry lock poisoned")
            .contains(execution_id)
    }
}

/// Releases the registry slot on drop, whatever way the loop exited.
pub struct TrackerGuard {
    execution_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.execution_id);
        }
    }
}

/// Poll a submitted execution to completion and archive the result.
///
/// Runs the tracker on `poll_interval` until a terminal status, the poll
/// loop fails, or `poll_timeout` elapses (zero disables the cap; on cap
/// the record is archived best-effort in whatever state it reached).
/// Finalization merges coarse payloads, the one-shot detailed fetch, and
/// the caller's provenance, then upserts into the store. A store write
/// failure is logged and the in-memory record still returned.
pub async fn track_execution(
    client: Arc<BackendClient>,
    store: &ResultStore,
    registry: &TrackerRegistry,
    execution_id: &str,
    provenance: Option<TestProvenance>,
    poll_interval: Duration,
    poll_timeout: Duration,
) -> Result<ExecutionRecord> {
    let _guard = registry.acquire(execution_id)?;

    let mut tracker = ExecutionTracker::new(Arc::clone(&client), execution_id);
    let deadline = (!poll_timeout.is_zero()).then(|| tokio::time::Instant::now() + poll_timeout);

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if tracker.tick().await == Tick::Terminal {
            break;
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                warn!(execution_id, "Gave up waiting for a terminal status");
                tracker.stop();
                break;
            }
        }
    }

    let mut record = tracker.record().clone();
    if record.status.is_terminal() {
        augment_with_details(&client, &mut record).await;
    }
    if let Some(provenance) = provenance {
        let mut carrier = ExecutionRecord::new(execution_id);
        carrier.status = record.status;
        carrier.test_info = Some(provenance);
        record.merge_from(&carrier);
    }

    match store.upsert(&record) {
        Ok(stored) => Ok(stored),
        Err(e) => {
            warn!(execution_id, "Failed to archive result: {}", e);
            Ok(record)
        }
    }
}

/// Idempotent accessor: an archived record is returned as-is with zero
/// network calls; a miss does one status fetch plus the best-effort
/// detailed fetch, archives, and returns the merged record.
pub async fn fetch_and_save_result(
    client: &BackendClient,
    store: &ResultStore,
    execution_id: &str,
    provenance: Option<TestProvenance>,
) -> Result<ExecutionRecord> {
    if let Some(existing) = store.get(execution_id)? {
        debug!(execution_id, "Serving archived result");
        return Ok(existing);
    }
    fetch_merge_save(client, store, execution_id, provenance).await
}

/// Cache-bypassing variant of [`fetch_and_save_result`]: always re-fetches
/// and merges into whatever is already archived.
pub async fn refresh_result(
    client: &BackendClient,
    store: &ResultStore,
    execution_id: &str,
) -> Result<ExecutionRecord> {
    fetch_merge_save(client, store, execution_id, None).await
}

async fn fetch_merge_save(
    client: &BackendClient,
    store: &ResultStore,
    execution_id: &str,
    provenance: Option<TestProvenance>,
) -> Result<ExecutionRecord> {
    let payload = client.execution_status(execution_id).await?;
    let mut record = payload.into_record(execution_id);

    if record.status.is_terminal() {
        augment_with_details(client, &mut record).await;
    }
    record.test_info = provenance;

    let stored = store.upsert(&record)?;
    Ok(stored)
}

/// One best-effort detailed-metrics fetch. Failure is logged and
/// swallowed; the coarse record is a sufficient fallback and
/// finalization must never block on this.
async fn augment_with_details(client: &BackendClient, record: &mut ExecutionRecord) {
    let id = record.execution_id.clone();
    match client.execution_metrics(&id).await {
        Ok(detailed) => {
            record.merge_from(&detailed.into_record(&id, record.status));
        }
        Err(e) => {
            warn!(execution_id = %id, "Detailed metrics unavailable: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionMetrics;
    use crate::store::schema;
    use r2d2_sqlite::SqliteConnectionManager;

    fn memory_store() -> ResultStore {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
        schema::migrate(&pool.get().unwrap()).unwrap();
        ResultStore::new(pool)
    }

    fn unreachable_client() -> Arc<BackendClient> {
        // Nothing listens on port 1; any request fails fast.
        Arc::new(BackendClient::new("http://127.0.0.1:1").unwrap())
    }

    #[test]
    fn test_registry_rejects_duplicate_start() {
        let registry = TrackerRegistry::new();
        let guard = registry.acquire("exec-1").unwrap();
        assert!(registry.is_active("exec-1"));
        assert!(registry.acquire("exec-1").is_err());
        // a different id is unaffected
        let _other = registry.acquire("exec-2").unwrap();

        drop(guard);
        assert!(!registry.is_active("exec-1"));
        assert!(registry.acquire("exec-1").is_ok());
    }

    #[tokio::test]
    async fn test_poll_failure_maps_to_error_and_stops() {
        let mut tracker = ExecutionTracker::new(unreachable_client(), "exec-1");
        assert_eq!(tracker.tick().await, Tick::Terminal);
        assert_eq!(tracker.record().status, ExecutionStatus::Error);
        assert!(tracker.is_stopped());
        // subsequent ticks are no-ops
        assert_eq!(tracker.tick().await, Tick::Terminal);
    }

    #[tokio::test]
    async fn test_stop_halts_without_touching_record() {
        let mut tracker = ExecutionTracker::new(unreachable_client(), "exec-1");
        tracker.stop();
        assert_eq!(tracker.tick().await, Tick::Terminal);
        assert_eq!(tracker.record().status, ExecutionStatus::Starting);
    }

    #[tokio::test]
    async fn test_fetch_and_save_serves_archive_without_network() {
        let store = memory_store();
        let mut archived = ExecutionRecord::new("exec-1");
        archived.status = ExecutionStatus::Completed;
        archived.metrics = Some(ExecutionMetrics {
            tests_run: Some(3),
            ..Default::default()
        });
        store.upsert(&archived).unwrap();

        // The client cannot reach anything; a hit proves no round-trip
        // was attempted.
        let client = unreachable_client();
        let got = fetch_and_save_result(&client, &store, "exec-1", None)
            .await
            .unwrap();
        assert_eq!(got.status, ExecutionStatus::Completed);
        assert_eq!(got.metrics.unwrap().tests_run, Some(3));
    }

    #[tokio::test]
    async fn test_fetch_and_save_miss_surfaces_backend_error() {
        let store = memory_store();
        let client = unreachable_client();
        let err = fetch_and_save_result(&client, &store, "exec-404", None).await;
        assert!(err.is_err());
        // nothing was archived for the failed fetch
        assert!(store.get("exec-404").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_track_execution_failure_archives_error_record() {
        let store = memory_store();
        let registry = TrackerRegistry::new();
        let record = track_execution(
            unreachable_client(),
            &store,
            &registry,
            "exec-1",
            Some(TestProvenance {
                test_type: Some("unit".into()),
                ..Default::default()
            }),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(record.status, ExecutionStatus::Error);
        assert_eq!(
            record.test_info.as_ref().unwrap().test_type.as_deref(),
            Some("unit")
        );
        // the best-effort record landed in the archive
        let stored = store.get("exec-1").unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Error);
        // and the registry slot was released
        assert!(!registry.is_active("exec-1"));
    }
}
