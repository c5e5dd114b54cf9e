//! Research workflow controller.
//!
//! Sequences one run end to end: credential check, follow-up generation,
//! the concurrent search phase (collaborator plus progress monitor), then
//! the optional report, summary, and graph exports.
//!
//! Failure handling follows three buckets. Fatal: a missing credential or
//! an error preparing the output directories — the run aborts. Degraded:
//! follow-up generation, the research call itself, and each export — the
//! run continues on a reduced path with an operator-visible notice, and
//! a failure in one artifact never rolls back another. Transient: snapshot
//! misses, handled entirely inside the progress channel.

use crate::config::ResearchMode;
use crate::error::{EngineError, ScoutError};
use crate::export::{self, ArtifactKind, OutputPaths};
use crate::graph;
use crate::progress::{NoOpProgressObserver, ProgressMonitor, ProgressObserver};
use crate::research::{FollowUpAnswer, ResearchCollaborator, ResearchOutcome, combine_query};
use crate::state::{RunStats, StateStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Phases of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    ConfiguringRun,
    GeneratingFollowUps,
    Searching,
    ReportDecision,
    ReportGeneration,
    GraphDecision,
    GraphGeneration,
    Done,
    FailedFatal,
}

/// Operator-visible notices emitted on degraded paths.
#[derive(Debug, Clone)]
pub enum WorkflowNotice {
    /// Follow-up generation failed; the run continues with zero answers.
    FollowUpsUnavailable { reason: String },
    /// The research call itself failed; partial progress is kept.
    ResearchFailed { reason: String },
    /// The provider refused for quota reasons during an export phase.
    QuotaExhausted { reason: String },
    /// An artifact could not be produced; other artifacts are unaffected.
    ArtifactFailed { kind: ArtifactKind, reason: String },
}

/// Parameters collected before a run starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub mode: ResearchMode,
    pub breadth: u32,
    pub depth: u32,
}

/// External confirmation and follow-up answering surface.
///
/// The terminal front end implements this with interactive prompts; tests
/// script it.
#[async_trait]
pub trait WorkflowCallback: Send + Sync {
    /// The controller entered a new phase.
    async fn on_phase_change(&self, phase: RunPhase);

    /// Ask the operator to answer one follow-up question.
    async fn answer_follow_up(&self, index: usize, total: usize, question: &str) -> String;

    /// Should the final report be generated?
    async fn confirm_report(&self) -> bool;

    /// Should the knowledge graph be generated?
    async fn confirm_graph(&self) -> bool;

    /// A degraded-path notice to surface.
    async fn on_notice(&self, notice: &WorkflowNotice);

    /// An artifact was written.
    async fn on_artifact_saved(&self, kind: ArtifactKind, path: &Path);
}

/// Callback that answers nothing and declines every export.
pub struct NoOpWorkflowCallback;

#[async_trait]
impl WorkflowCallback for NoOpWorkflowCallback {
    async fn on_phase_change(&self, _phase: RunPhase) {}
    async fn answer_follow_up(&self, _index: usize, _total: usize, _question: &str) -> String {
        String::new()
    }
    async fn confirm_report(&self) -> bool {
        false
    }
    async fn confirm_graph(&self) -> bool {
        false
    }
    async fn on_notice(&self, _notice: &WorkflowNotice) {}
    async fn on_artifact_saved(&self, _kind: ArtifactKind, _path: &Path) {}
}

/// Paths of everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub tree_archive: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub report_html: Option<PathBuf>,
    pub graph: Option<PathBuf>,
}

/// Final outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub artifacts: RunArtifacts,
    pub stats: RunStats,
}

/// The orchestrating state machine for one research run.
pub struct WorkflowController<C> {
    collaborator: C,
    callback: Arc<dyn WorkflowCallback>,
    store: StateStore,
    paths: OutputPaths,
    snapshot_path: PathBuf,
    poll_interval: Duration,
    observer: Arc<dyn ProgressObserver>,
    credential_var: String,
}

impl<C: ResearchCollaborator> WorkflowController<C> {
    pub fn new(
        collaborator: C,
        store: StateStore,
        paths: OutputPaths,
        snapshot_path: impl Into<PathBuf>,
        callback: Arc<dyn WorkflowCallback>,
    ) -> Self {
        Self {
            collaborator,
            callback,
            store,
            paths,
            snapshot_path: snapshot_path.into(),
            poll_interval: crate::progress::DEFAULT_POLL_INTERVAL,
            observer: Arc::new(NoOpProgressObserver),
            credential_var: "GEMINI_API_KEY".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Name of the environment variable that must hold the API credential.
    pub fn with_credential_var(mut self, var: impl Into<String>) -> Self {
        self.credential_var = var.into();
        self
    }

    async fn enter(&self, phase: RunPhase) {
        info!(?phase, "workflow phase");
        self.callback.on_phase_change(phase).await;
    }

    fn check_credential(&self) -> Result<(), EngineError> {
        match std::env::var(&self.credential_var) {
            Ok(value) if !value.trim().is_empty() => Ok(()),
            _ => Err(EngineError::AuthFailed {
                var: self.credential_var.clone(),
            }),
        }
    }

    /// Drive one run through the full phase sequence.
    ///
    /// Returns `Err` only for fatal failures; every other failure shows up
    /// as a notice and a shorter artifact list.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, ScoutError> {
        // Init — the only unconditionally fatal phase. No monitor is
        // running yet, so there is nothing to release on this path.
        self.enter(RunPhase::Init).await;
        if let Err(err) = self.check_credential() {
            self.enter(RunPhase::FailedFatal).await;
            return Err(err.into());
        }
        if let Err(err) = self.paths.ensure_dirs() {
            self.enter(RunPhase::FailedFatal).await;
            return Err(err.into());
        }

        // ConfiguringRun — input was collected externally; record it.
        self.enter(RunPhase::ConfiguringRun).await;
        self.store.reset();
        self.store
            .set_parameters(request.mode, request.breadth, request.depth);

        // GeneratingFollowUps — recoverable: degrade to zero answers.
        self.enter(RunPhase::GeneratingFollowUps).await;
        let answers = match self.collaborator.generate_follow_ups(&request.query).await {
            Ok(questions) => {
                let total = questions.len();
                let mut answers = Vec::with_capacity(total);
                for (i, question) in questions.iter().enumerate() {
                    let answer = self.callback.answer_follow_up(i + 1, total, question).await;
                    answers.push(FollowUpAnswer {
                        question: question.clone(),
                        answer,
                    });
                }
                answers
            }
            Err(err) => {
                warn!(error = %err, "follow-up generation failed, continuing without");
                self.callback
                    .on_notice(&WorkflowNotice::FollowUpsUnavailable {
                        reason: err.to_string(),
                    })
                    .await;
                Vec::new()
            }
        };
        let combined = combine_query(&request.query, &answers);

        // Searching — the collaborator and the poll loop run concurrently.
        // No early return is permitted between spawn and shutdown: the
        // monitor must be fully stopped before any post-phase read, on the
        // success and the failure path alike.
        self.enter(RunPhase::Searching).await;
        self.store.set_searching(true);
        let monitor = ProgressMonitor::new(self.snapshot_path.clone(), self.store.clone())
            .with_interval(self.poll_interval)
            .with_observer(self.observer.clone())
            .spawn();
        let research = self
            .collaborator
            .run_research(&combined, request.breadth, request.depth)
            .await;
        monitor.shutdown().await;
        self.store.set_searching(false);

        let outcome = match research {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "research call failed, keeping partial progress");
                self.callback
                    .on_notice(&WorkflowNotice::ResearchFailed {
                        reason: err.to_string(),
                    })
                    .await;
                ResearchOutcome::default()
            }
        };
        self.store.update_sources(outcome.sources);
        for learning in outcome.learnings {
            self.store.add_learning(learning);
        }

        let tree = self.store.tree();
        let mut artifacts = RunArtifacts::default();

        // Archive the final tree. Isolated: a write failure costs only
        // this artifact.
        if let Some(ref tree) = tree {
            match export::archive_tree(&self.paths, tree) {
                Ok(path) => {
                    self.callback
                        .on_artifact_saved(ArtifactKind::TreeArchive, &path)
                        .await;
                    artifacts.tree_archive = Some(path);
                }
                Err(err) => {
                    self.notify_artifact_failure(ArtifactKind::TreeArchive, &err.to_string())
                        .await;
                }
            }
        }

        self.enter(RunPhase::ReportDecision).await;
        if self.callback.confirm_report().await {
            self.run_report_phases(&request, &combined, tree.clone(), &mut artifacts)
                .await;
        }

        self.enter(RunPhase::Done).await;
        Ok(RunOutcome {
            artifacts,
            stats: self.store.snapshot_stats(),
        })
    }

    /// Report generation, summary export, and the graph branch.
    ///
    /// Every failure in here is isolated: a failed graph never invalidates
    /// a saved report and vice versa.
    async fn run_report_phases(
        &self,
        request: &RunRequest,
        combined: &str,
        tree: Option<crate::tree::QueryNode>,
        artifacts: &mut RunArtifacts,
    ) {
        self.enter(RunPhase::ReportGeneration).await;
        let learnings = self.store.learnings();
        let sources = self.store.sources();

        match self
            .collaborator
            .generate_report(combined, &learnings, &sources)
            .await
        {
            Ok(report) => {
                match export::save_report(&self.paths, &request.query, &report) {
                    Ok(path) => {
                        self.store.set_report_path(path.clone());
                        self.callback
                            .on_artifact_saved(ArtifactKind::Report, &path)
                            .await;
                        artifacts.report = Some(path);
                    }
                    Err(err) => {
                        self.notify_artifact_failure(ArtifactKind::Report, &err.to_string())
                            .await;
                    }
                }
                match export::export_report_html(&self.paths, &request.query, &report) {
                    Ok(path) => {
                        self.callback
                            .on_artifact_saved(ArtifactKind::ReportHtml, &path)
                            .await;
                        artifacts.report_html = Some(path);
                    }
                    Err(err) => {
                        self.notify_artifact_failure(ArtifactKind::ReportHtml, &err.to_string())
                            .await;
                    }
                }
            }
            Err(err) if err.is_quota() => {
                warn!(error = %err, "report generation hit provider quota");
                self.callback
                    .on_notice(&WorkflowNotice::QuotaExhausted {
                        reason: err.to_string(),
                    })
                    .await;
                return;
            }
            Err(err) => {
                warn!(error = %err, "report generation failed");
                self.notify_artifact_failure(ArtifactKind::Report, &err.to_string())
                    .await;
                return;
            }
        }

        // Summary export rides with the report phase.
        let summary = export::build_summary(
            &request.query,
            tree.clone(),
            sources,
            learnings,
            self.store.started_at(),
            Utc::now(),
        );
        match export::export_summary(&self.paths, &summary) {
            Ok(path) => {
                self.callback
                    .on_artifact_saved(ArtifactKind::Summary, &path)
                    .await;
                artifacts.summary = Some(path);
            }
            Err(err) => {
                self.notify_artifact_failure(ArtifactKind::Summary, &err.to_string())
                    .await;
            }
        }

        self.enter(RunPhase::GraphDecision).await;
        if self.callback.confirm_graph().await {
            self.enter(RunPhase::GraphGeneration).await;
            let model = graph::extract(tree.as_ref(), &self.store.sources());
            match export::export_graph_html(&self.paths, &model) {
                Ok(path) => {
                    self.store.set_graph_path(path.clone());
                    self.callback
                        .on_artifact_saved(ArtifactKind::Graph, &path)
                        .await;
                    artifacts.graph = Some(path);
                }
                Err(err) => {
                    self.notify_artifact_failure(ArtifactKind::Graph, &err.to_string())
                        .await;
                }
            }
        }
    }

    async fn notify_artifact_failure(&self, kind: ArtifactKind, reason: &str) {
        warn!(kind = kind.describe(), reason, "artifact export failed");
        self.callback
            .on_notice(&WorkflowNotice::ArtifactFailed {
                kind,
                reason: reason.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serialization_names() {
        let json = serde_json::to_value(RunPhase::GeneratingFollowUps).unwrap();
        assert_eq!(json, "generating_follow_ups");
        let json = serde_json::to_value(RunPhase::FailedFatal).unwrap();
        assert_eq!(json, "failed_fatal");
    }

    #[tokio::test]
    async fn test_noop_callback_declines_exports() {
        let callback = NoOpWorkflowCallback;
        assert!(!callback.confirm_report().await);
        assert!(!callback.confirm_graph().await);
        assert_eq!(callback.answer_follow_up(1, 1, "q?").await, "");
    }
}
