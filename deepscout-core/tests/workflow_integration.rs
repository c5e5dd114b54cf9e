//! End-to-end workflow controller tests against a scripted collaborator.

use deepscout_core::export::{ArtifactKind, OutputPaths};
use deepscout_core::research::{MockCollaborator, MockReportBehavior, ResearchOutcome};
use deepscout_core::state::StateStore;
use deepscout_core::tree::{QueryNode, QueryStatus, SourceEntry};
use deepscout_core::workflow::{
    RunPhase, RunRequest, WorkflowCallback, WorkflowController, WorkflowNotice,
};
use deepscout_core::{ResearchMode, ScoutError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const TICK: Duration = Duration::from_millis(10);

/// Callback that records everything and answers from a script.
struct RecordingCallback {
    phases: Mutex<Vec<RunPhase>>,
    notices: Mutex<Vec<String>>,
    saved: Mutex<Vec<(ArtifactKind, PathBuf)>>,
    generate_report: bool,
    generate_graph: bool,
}

impl RecordingCallback {
    fn new(generate_report: bool, generate_graph: bool) -> Arc<Self> {
        Arc::new(Self {
            phases: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            saved: Mutex::new(Vec::new()),
            generate_report,
            generate_graph,
        })
    }

    fn phases(&self) -> Vec<RunPhase> {
        self.phases.lock().unwrap().clone()
    }

    fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    fn saved_kinds(&self) -> Vec<ArtifactKind> {
        self.saved.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

#[async_trait::async_trait]
impl WorkflowCallback for RecordingCallback {
    async fn on_phase_change(&self, phase: RunPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    async fn answer_follow_up(&self, _index: usize, _total: usize, question: &str) -> String {
        format!("answer to {question}")
    }

    async fn confirm_report(&self) -> bool {
        self.generate_report
    }

    async fn confirm_graph(&self) -> bool {
        self.generate_graph
    }

    async fn on_notice(&self, notice: &WorkflowNotice) {
        let tag = match notice {
            WorkflowNotice::FollowUpsUnavailable { .. } => "follow_ups",
            WorkflowNotice::ResearchFailed { .. } => "research",
            WorkflowNotice::QuotaExhausted { .. } => "quota",
            WorkflowNotice::ArtifactFailed { .. } => "artifact",
        };
        self.notices.lock().unwrap().push(tag.to_string());
    }

    async fn on_artifact_saved(&self, kind: ArtifactKind, path: &Path) {
        self.saved.lock().unwrap().push((kind, path.to_path_buf()));
    }
}

fn sample_tree() -> QueryNode {
    QueryNode {
        query: "root".into(),
        status: QueryStatus::Completed,
        learnings: vec!["learning one".into()],
        sub_queries: vec![
            QueryNode {
                query: "left".into(),
                status: QueryStatus::Completed,
                learnings: vec!["learning two".into()],
                id: Some("left".into()),
                ..QueryNode::default()
            },
            QueryNode {
                query: "right".into(),
                status: QueryStatus::Waiting,
                ..QueryNode::default()
            },
        ],
        id: Some("root".into()),
        ..QueryNode::default()
    }
}

fn sample_outcome() -> ResearchOutcome {
    ResearchOutcome {
        learnings: vec!["learning one".into(), "learning two".into()],
        sources: HashMap::from([(
            "https://example.com/a".to_string(),
            SourceEntry {
                title: "Example A".into(),
                link: "https://example.com/a".into(),
            },
        )]),
    }
}

fn request() -> RunRequest {
    RunRequest {
        query: "what is under test".into(),
        mode: ResearchMode::Fast,
        breadth: 2,
        depth: 1,
    }
}

fn set_credential(var: &str) {
    // SAFETY: test-only; each test uses its own variable name.
    unsafe { std::env::set_var(var, "test-key") };
}

struct Harness {
    _dir: TempDir,
    paths: OutputPaths,
    snapshot_path: PathBuf,
    store: StateStore,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let paths = OutputPaths::new(dir.path().join("results"));
    let snapshot_path = dir.path().join("research_tree.json");
    Harness {
        paths,
        snapshot_path,
        store: StateStore::new(),
        _dir: dir,
    }
}

#[tokio::test]
async fn full_run_produces_all_artifacts() {
    set_credential("DEEPSCOUT_TEST_KEY_FULL");
    let h = harness();
    let collaborator = MockCollaborator {
        follow_ups: vec!["which aspect?".into()],
        report: "# Findings\n\nAll good.".into(),
        outcome: sample_outcome(),
        snapshot: Some(sample_tree()),
        snapshot_path: Some(h.snapshot_path.clone()),
        research_delay: Some(TICK * 10),
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(true, true);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_FULL");

    let outcome = controller.run(request()).await.unwrap();

    // The poll loop picked the snapshot up during the search phase.
    assert_eq!(outcome.stats.total_queries, 3);
    assert_eq!(outcome.stats.completed_queries, 2);
    assert_eq!(outcome.stats.knowledge_points, 2);
    assert_eq!(outcome.stats.unique_sources, 1);

    // Every artifact landed and exists on disk.
    for path in [
        outcome.artifacts.tree_archive.as_ref(),
        outcome.artifacts.summary.as_ref(),
        outcome.artifacts.report.as_ref(),
        outcome.artifacts.report_html.as_ref(),
        outcome.artifacts.graph.as_ref(),
    ] {
        assert!(path.is_some_and(|p| p.exists()), "missing artifact");
    }

    let phases = callback.phases();
    assert_eq!(
        phases,
        vec![
            RunPhase::Init,
            RunPhase::ConfiguringRun,
            RunPhase::GeneratingFollowUps,
            RunPhase::Searching,
            RunPhase::ReportDecision,
            RunPhase::ReportGeneration,
            RunPhase::GraphDecision,
            RunPhase::GraphGeneration,
            RunPhase::Done,
        ]
    );
    assert!(callback.notices().is_empty());
    assert_eq!(callback.saved_kinds().len(), 5);
}

#[tokio::test]
async fn missing_credential_is_fatal() {
    let h = harness();
    let callback = RecordingCallback::new(true, true);
    let controller = WorkflowController::new(
        MockCollaborator::default(),
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_credential_var("DEEPSCOUT_TEST_KEY_DEFINITELY_UNSET");

    let err = controller.run(request()).await.unwrap_err();

    assert!(matches!(err, ScoutError::Engine(e) if e.to_string().contains("DEFINITELY_UNSET")));
    assert_eq!(callback.phases(), vec![RunPhase::Init, RunPhase::FailedFatal]);
}

#[tokio::test]
async fn follow_up_failure_degrades_to_zero_answers() {
    set_credential("DEEPSCOUT_TEST_KEY_FOLLOWUPS");
    let h = harness();
    let collaborator = MockCollaborator {
        fail_follow_ups: true,
        outcome: sample_outcome(),
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(false, false);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_FOLLOWUPS");

    let outcome = controller.run(request()).await.unwrap();

    assert!(callback.notices().contains(&"follow_ups".to_string()));
    assert!(callback.phases().contains(&RunPhase::Done));
    // Learnings from the outcome still landed in the store.
    assert_eq!(outcome.stats.unique_sources, 1);
}

#[tokio::test]
async fn research_failure_keeps_partial_progress() {
    set_credential("DEEPSCOUT_TEST_KEY_RESEARCH");
    let h = harness();
    let collaborator = MockCollaborator {
        fail_research: true,
        snapshot: Some(sample_tree()),
        snapshot_path: Some(h.snapshot_path.clone()),
        research_delay: Some(TICK * 10),
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(false, false);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_RESEARCH");

    let outcome = controller.run(request()).await.unwrap();

    // The run completed despite the failed research call, and the tree
    // polled before the failure is still available for export.
    assert!(callback.notices().contains(&"research".to_string()));
    assert!(callback.phases().contains(&RunPhase::Done));
    assert_eq!(outcome.stats.total_queries, 3);
    assert!(outcome.artifacts.tree_archive.is_some());
}

#[tokio::test]
async fn quota_exhaustion_gets_distinct_notice_and_skips_graph() {
    set_credential("DEEPSCOUT_TEST_KEY_QUOTA");
    let h = harness();
    let collaborator = MockCollaborator {
        outcome: sample_outcome(),
        report_behavior: MockReportBehavior::FailQuota,
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(true, true);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_QUOTA");

    let outcome = controller.run(request()).await.unwrap();

    assert!(callback.notices().contains(&"quota".to_string()));
    assert!(!callback.phases().contains(&RunPhase::GraphDecision));
    assert!(outcome.artifacts.report.is_none());
    assert!(outcome.artifacts.graph.is_none());
    // The accumulated learnings survive the failure for inspection.
    assert_eq!(h.store.learnings().len(), 2);
}

#[tokio::test]
async fn declining_report_skips_graph_and_reaches_done() {
    set_credential("DEEPSCOUT_TEST_KEY_DECLINE");
    let h = harness();
    let collaborator = MockCollaborator {
        outcome: sample_outcome(),
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(false, false);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_DECLINE");

    let outcome = controller.run(request()).await.unwrap();

    let phases = callback.phases();
    assert!(phases.contains(&RunPhase::ReportDecision));
    assert!(!phases.contains(&RunPhase::ReportGeneration));
    assert!(!phases.contains(&RunPhase::GraphDecision));
    assert!(outcome.artifacts.report.is_none());
}

#[tokio::test]
async fn poll_loop_is_stopped_before_post_phase_reads() {
    set_credential("DEEPSCOUT_TEST_KEY_CANCEL");
    let h = harness();
    let collaborator = MockCollaborator {
        outcome: sample_outcome(),
        snapshot: Some(sample_tree()),
        snapshot_path: Some(h.snapshot_path.clone()),
        research_delay: Some(TICK * 10),
        ..MockCollaborator::default()
    };
    let callback = RecordingCallback::new(false, false);
    let controller = WorkflowController::new(
        collaborator,
        h.store.clone(),
        h.paths.clone(),
        h.snapshot_path.clone(),
        callback.clone(),
    )
    .with_poll_interval(TICK)
    .with_credential_var("DEEPSCOUT_TEST_KEY_CANCEL");

    controller.run(request()).await.unwrap();

    // Rewrite the snapshot after the run; a still-live poll loop would
    // push it into the store within a few ticks.
    let stale = QueryNode {
        query: "stale write after cancellation".into(),
        ..QueryNode::default()
    };
    std::fs::write(
        &h.snapshot_path,
        serde_json::to_string(&stale).unwrap(),
    )
    .unwrap();
    tokio::time::sleep(TICK * 6).await;

    assert_eq!(h.store.tree().unwrap().query, "root");
    assert!(!h.store.is_searching());
}
