//! # deepscout core
//!
//! Core library for the deepscout research laboratory: the query-tree data
//! model and aggregation, knowledge-graph extraction, the run-scoped shared
//! state store, the file-based progress channel, artifact export, and the
//! workflow controller that sequences a research run around an external
//! research collaborator.

pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod persistence;
pub mod progress;
pub mod research;
pub mod state;
pub mod tree;
pub mod workflow;

// Re-export commonly used types at the crate root.
pub use config::{ResearchMode, ScoutConfig, config_exists, load_config};
pub use error::{ConfigError, EngineError, Result, ScoutError};
pub use export::{ArtifactKind, OutputPaths, ResearchSummary};
pub use graph::{GraphLink, GraphModel, GraphNode, NodeKind};
pub use progress::{MonitorHandle, ProgressMonitor, ProgressObserver};
pub use research::{FollowUpAnswer, ResearchCollaborator, ResearchOutcome, combine_query};
pub use state::{RunStats, SharedState, StateStore};
pub use tree::{NodeCount, QueryNode, QueryStatus, SourceEntry};
pub use workflow::{
    RunOutcome, RunPhase, RunRequest, WorkflowCallback, WorkflowController, WorkflowNotice,
};
