//! File-based progress channel — consumer side.
//!
//! The research collaborator writes the query tree to a well-known path on
//! its own schedule; the `ProgressMonitor` polls that path and pushes every
//! successfully parsed snapshot into the `StateStore`. A missing or torn
//! file is an expected condition while the producer is still working: it is
//! reported to the observer as a waiting state and retried on the next
//! tick, never treated as an error.
//!
//! The channel assumes one producer and one consumer on the same machine
//! and offers eventual consistency only: the in-memory state is
//! authoritative for the last snapshot that parsed, never a partial one.

use crate::state::{RunStats, StateStore};
use crate::tree::QueryNode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default interval between snapshot polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Why a poll tick produced no tree.
#[derive(Debug)]
pub enum SnapshotMiss {
    /// The producer has not written the file yet (or it is unreadable).
    Missing,
    /// The file exists but does not parse, likely mid-write.
    Malformed(serde_json::Error),
}

/// Read and parse the snapshot file once.
pub fn read_snapshot(path: &Path) -> Result<QueryNode, SnapshotMiss> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "snapshot not readable");
            return Err(SnapshotMiss::Missing);
        }
    };
    serde_json::from_str(&data).map_err(SnapshotMiss::Malformed)
}

/// Receives progress-channel events, for display purposes only.
pub trait ProgressObserver: Send + Sync {
    /// A fresh snapshot was accepted into the store.
    fn on_tree_update(&self, stats: &RunStats);
    /// The snapshot file was absent or unparseable this tick.
    fn on_waiting(&self);
}

/// Observer that ignores every event.
pub struct NoOpProgressObserver;

impl ProgressObserver for NoOpProgressObserver {
    fn on_tree_update(&self, _stats: &RunStats) {}
    fn on_waiting(&self) {}
}

/// Polls the snapshot path and feeds the state store.
pub struct ProgressMonitor {
    path: PathBuf,
    interval: Duration,
    store: StateStore,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressMonitor {
    pub fn new(path: impl Into<PathBuf>, store: StateStore) -> Self {
        Self {
            path: path.into(),
            interval: DEFAULT_POLL_INTERVAL,
            store,
            observer: Arc::new(NoOpProgressObserver),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start polling in the background.
    ///
    /// The returned handle owns the cancellation token. Stopping is a
    /// two-phase protocol — see [`MonitorHandle::shutdown`]; dropping the
    /// handle does not stop the task.
    pub fn spawn(self) -> MonitorHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move { self.run(child).await });
        MonitorHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            // Cancellation is cooperative: once a tick starts, it finishes
            // before the next cancellation check.
            match read_snapshot(&self.path) {
                Ok(tree) => {
                    self.store.update_tree(tree);
                    let stats = self.store.snapshot_stats();
                    self.observer.on_tree_update(&stats);
                }
                Err(SnapshotMiss::Missing) => {
                    self.observer.on_waiting();
                }
                Err(SnapshotMiss::Malformed(err)) => {
                    debug!(
                        path = %self.path.display(),
                        error = %err,
                        "snapshot unparseable, producer likely mid-write"
                    );
                    self.observer.on_waiting();
                }
            }
        }
    }
}

/// Handle for the two-phase stop protocol: request cancellation, then await
/// completion. Callers must not read state the monitor writes until
/// `shutdown` has returned.
pub struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Cancel the poll loop and wait for the task to finish.
    ///
    /// After this returns, no further store mutation from the monitor can
    /// occur.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "progress monitor task did not exit cleanly");
        }
    }
}
