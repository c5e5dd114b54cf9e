//! Run-scoped shared state.
//!
//! One `StateStore` is constructed per research run and handed by clone to
//! the progress monitor and the workflow controller — there is no global
//! singleton. Every operation takes the lock exactly once and never holds
//! it across an await point, so the two writers active during a run (the
//! monitor for tree/sources, the controller for everything else) can never
//! observe a half-applied update.

use crate::config::ResearchMode;
use crate::persistence;
use crate::tree::{self, QueryNode, SourceEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// All mutable state for one research run.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Last successfully parsed tree snapshot.
    pub tree: Option<QueryNode>,
    /// Visited sources, keyed by an opaque URL-derived identifier.
    pub sources: HashMap<String, SourceEntry>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Whether the search phase is currently active.
    pub is_searching: bool,
    /// Run parameters.
    pub mode: ResearchMode,
    pub breadth: u32,
    pub depth: u32,
    /// Accumulated learnings, deduplicated, in insertion order.
    pub learnings: Vec<String>,
    /// Saved report artifact, if any.
    pub report_path: Option<PathBuf>,
    /// Saved graph artifact, if any.
    pub graph_path: Option<PathBuf>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            tree: None,
            sources: HashMap::new(),
            started_at: Utc::now(),
            is_searching: false,
            mode: ResearchMode::default(),
            breadth: 10,
            depth: 5,
            learnings: Vec::new(),
            report_path: None,
            graph_path: None,
        }
    }
}

/// Consolidated dashboard statistics for the current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub total_queries: usize,
    pub completed_queries: usize,
    pub completion_rate: f64,
    pub knowledge_points: usize,
    pub unique_sources: usize,
    pub current_depth: usize,
    pub elapsed_secs: u64,
}

/// Cheaply cloneable handle to the run state.
///
/// All external writes (the progress monitor and the workflow controller)
/// must go through these operations.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<SharedState>>,
    /// Where `update_tree` checkpoints the accepted snapshot, if anywhere.
    checkpoint_path: Option<PathBuf>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState::default())),
            checkpoint_path: None,
        }
    }

    /// A store that checkpoints every accepted tree to `path`.
    ///
    /// The checkpoint write is best-effort: a failure is logged and never
    /// propagated, and it has no transactional relationship to the
    /// in-memory update.
    pub fn with_checkpoint(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState::default())),
            checkpoint_path: Some(path.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // A poisoned lock only means a panicking thread died mid-operation;
        // the state itself is still plain data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reinitialize every field to defaults. Prior persisted files are
    /// untouched.
    pub fn reset(&self) {
        *self.lock() = SharedState::default();
    }

    /// Replace the tree with a freshly parsed snapshot and checkpoint it.
    pub fn update_tree(&self, node: QueryNode) {
        {
            let mut state = self.lock();
            state.tree = Some(node.clone());
        }
        if let Some(path) = &self.checkpoint_path
            && let Err(err) = persistence::atomic_write_json(path, &node)
        {
            warn!(path = %path.display(), error = %err, "tree checkpoint write failed");
        }
    }

    /// Replace the visited-source map.
    pub fn update_sources(&self, sources: HashMap<String, SourceEntry>) {
        self.lock().sources = sources;
    }

    /// Append a learning unless an identical one is already present.
    pub fn add_learning(&self, learning: impl Into<String>) {
        let learning = learning.into();
        let mut state = self.lock();
        if !state.learnings.contains(&learning) {
            state.learnings.push(learning);
        }
    }

    /// Record the parameters the run was configured with.
    pub fn set_parameters(&self, mode: ResearchMode, breadth: u32, depth: u32) {
        let mut state = self.lock();
        state.mode = mode;
        state.breadth = breadth;
        state.depth = depth;
    }

    pub fn set_searching(&self, searching: bool) {
        self.lock().is_searching = searching;
    }

    pub fn set_report_path(&self, path: PathBuf) {
        self.lock().report_path = Some(path);
    }

    pub fn set_graph_path(&self, path: PathBuf) {
        self.lock().graph_path = Some(path);
    }

    /// Clone of the current tree snapshot.
    pub fn tree(&self) -> Option<QueryNode> {
        self.lock().tree.clone()
    }

    pub fn sources(&self) -> HashMap<String, SourceEntry> {
        self.lock().sources.clone()
    }

    pub fn learnings(&self) -> Vec<String> {
        self.lock().learnings.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.lock().started_at
    }

    pub fn is_searching(&self) -> bool {
        self.lock().is_searching
    }

    /// Consolidated statistics over the current state.
    pub fn snapshot_stats(&self) -> RunStats {
        let state = self.lock();
        let count = tree::count_nodes(state.tree.as_ref());
        let completion_rate = if count.total > 0 {
            count.completed as f64 / count.total as f64
        } else {
            0.0
        };
        RunStats {
            total_queries: count.total,
            completed_queries: count.completed,
            completion_rate,
            knowledge_points: tree::count_knowledge_points(state.tree.as_ref()),
            unique_sources: tree::count_unique_sources(&state.sources),
            current_depth: tree::max_depth(state.tree.as_ref()),
            elapsed_secs: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
