//! The research collaborator seam.
//!
//! The engine that actually expands queries, retrieves sources, and writes
//! progress snapshots lives behind this trait. The core only consumes its
//! returned results and the snapshot files it persists; how it researches
//! is its own business.

use crate::error::EngineError;
use crate::tree::SourceEntry;
use async_trait::async_trait;
use std::collections::HashMap;

/// Final payload of a research run.
#[derive(Debug, Clone, Default)]
pub struct ResearchOutcome {
    /// Learnings in collection order (deduplication happens in the store).
    pub learnings: Vec<String>,
    /// Visited sources keyed by an opaque URL-derived identifier.
    pub sources: HashMap<String, SourceEntry>,
}

/// An answered follow-up question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpAnswer {
    pub question: String,
    pub answer: String,
}

/// The externally-executed research engine.
#[async_trait]
pub trait ResearchCollaborator: Send + Sync {
    /// Run the full research task. Implementations own the query tree and
    /// are expected to persist snapshots of it to the well-known path
    /// while they work.
    async fn run_research(
        &self,
        query: &str,
        breadth: u32,
        depth: u32,
    ) -> Result<ResearchOutcome, EngineError>;

    /// Generate clarifying follow-up questions for the initial query.
    async fn generate_follow_ups(&self, query: &str) -> Result<Vec<String>, EngineError>;

    /// Generate the final report from accumulated learnings and sources.
    async fn generate_report(
        &self,
        query: &str,
        learnings: &[String],
        sources: &HashMap<String, SourceEntry>,
    ) -> Result<String, EngineError>;
}

/// Merge the initial query with answered follow-ups into one composite
/// query string for the research engine.
pub fn combine_query(initial: &str, answers: &[FollowUpAnswer]) -> String {
    if answers.is_empty() {
        return initial.to_string();
    }
    let qa: Vec<String> = answers
        .iter()
        .map(|a| format!("- {}: {}", a.question, a.answer))
        .collect();
    format!(
        "Initial query: {initial}\n\nFollow up Q&A:\n{}",
        qa.join("\n")
    )
}

/// How the mock's report call should behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockReportBehavior {
    #[default]
    Succeed,
    FailQuota,
    FailGeneric,
}

/// Scriptable collaborator for tests.
///
/// `run_research` optionally sleeps (to let poll ticks interleave) and
/// optionally writes a scripted snapshot file, mimicking a producer.
#[derive(Default)]
pub struct MockCollaborator {
    pub follow_ups: Vec<String>,
    pub report: String,
    pub outcome: ResearchOutcome,
    pub fail_follow_ups: bool,
    pub fail_research: bool,
    pub report_behavior: MockReportBehavior,
    /// Written to `snapshot_path` during `run_research`, if both are set.
    pub snapshot: Option<crate::tree::QueryNode>,
    pub snapshot_path: Option<std::path::PathBuf>,
    /// How long `run_research` lingers before returning.
    pub research_delay: Option<std::time::Duration>,
}

#[async_trait]
impl ResearchCollaborator for MockCollaborator {
    async fn run_research(
        &self,
        _query: &str,
        _breadth: u32,
        _depth: u32,
    ) -> Result<ResearchOutcome, EngineError> {
        if let (Some(snapshot), Some(path)) = (&self.snapshot, &self.snapshot_path) {
            crate::persistence::atomic_write_json(path, snapshot)
                .map_err(|e| EngineError::ApiRequest {
                    message: e.to_string(),
                })?;
        }
        if let Some(delay) = self.research_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_research {
            return Err(EngineError::ApiRequest {
                message: "research failed".into(),
            });
        }
        Ok(self.outcome.clone())
    }

    async fn generate_follow_ups(&self, _query: &str) -> Result<Vec<String>, EngineError> {
        if self.fail_follow_ups {
            return Err(EngineError::ApiRequest {
                message: "follow-ups unavailable".into(),
            });
        }
        Ok(self.follow_ups.clone())
    }

    async fn generate_report(
        &self,
        _query: &str,
        _learnings: &[String],
        _sources: &HashMap<String, SourceEntry>,
    ) -> Result<String, EngineError> {
        match self.report_behavior {
            MockReportBehavior::Succeed => Ok(self.report.clone()),
            MockReportBehavior::FailQuota => Err(EngineError::QuotaExhausted {
                message: "RESOURCE_EXHAUSTED".into(),
            }),
            MockReportBehavior::FailGeneric => Err(EngineError::ApiRequest {
                message: "report failed".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_query_without_answers() {
        assert_eq!(combine_query("plain query", &[]), "plain query");
    }

    #[test]
    fn test_combine_query_with_answers() {
        let answers = vec![
            FollowUpAnswer {
                question: "Which region?".into(),
                answer: "Europe".into(),
            },
            FollowUpAnswer {
                question: "Which decade?".into(),
                answer: "1990s".into(),
            },
        ];
        let combined = combine_query("economic history", &answers);
        assert!(combined.starts_with("Initial query: economic history"));
        assert!(combined.contains("- Which region?: Europe"));
        assert!(combined.contains("- Which decade?: 1990s"));
    }

    #[tokio::test]
    async fn test_mock_collaborator_defaults() {
        let mock = MockCollaborator::default();
        assert!(mock.generate_follow_ups("q").await.unwrap().is_empty());
        let outcome = mock.run_research("q", 2, 1).await.unwrap();
        assert!(outcome.learnings.is_empty());
    }

    #[tokio::test]
    async fn test_mock_report_quota_failure() {
        let mock = MockCollaborator {
            report_behavior: MockReportBehavior::FailQuota,
            ..MockCollaborator::default()
        };
        let err = mock
            .generate_report("q", &[], &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is_quota());
    }
}
