//! Gemini-backed research collaborator.
//!
//! Expands the query into a sub-query tree level by level, collects
//! learnings and source suggestions per node, and writes the evolving tree
//! to the progress snapshot path after every node transition — this is the
//! producer side of the file-based progress channel. Auth uses the `?key=`
//! query parameter the native Gemini API expects.
//!
//! Model calls degrade individually: a failed expansion falls back to a
//! heuristic splitter and a failed learning fetch leaves that node bare.
//! Quota exhaustion aborts the run instead, since every later call would
//! hit the same wall.

use async_trait::async_trait;
use deepscout_core::config::{ResearchMode, ResearchSettings};
use deepscout_core::error::EngineError;
use deepscout_core::persistence;
use deepscout_core::research::{ResearchCollaborator, ResearchOutcome};
use deepscout_core::tree::{QueryNode, QueryStatus, SourceEntry};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on sub-queries spawned per run, whatever breadth and depth
/// the operator picked.
const NODE_BUDGET: usize = 40;

pub struct GeminiCollaborator {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
    model: String,
    snapshot_path: PathBuf,
    mode: ResearchMode,
}

/// Tree node in arena form: children always carry a higher index than
/// their parent, which keeps assembly iterative.
struct FlatNode {
    query: String,
    status: QueryStatus,
    learnings: Vec<String>,
    id: String,
    depth: u32,
    parent: Option<usize>,
}

impl GeminiCollaborator {
    pub fn from_settings(
        settings: &ResearchSettings,
        mode: ResearchMode,
    ) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: settings.api_key_env.clone(),
            model: settings.model.clone(),
            snapshot_path: settings.snapshot_path.clone(),
            mode,
        })
    }

    fn api_key(&self) -> Result<String, EngineError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EngineError::AuthFailed {
                var: self.api_key_env.clone(),
            })
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> EngineError {
        let brief: String = body.chars().take(200).collect();
        match status.as_u16() {
            401 | 403 => EngineError::AuthFailed {
                var: self.api_key_env.clone(),
            },
            429 => EngineError::QuotaExhausted { message: brief },
            _ if body.contains("RESOURCE_EXHAUSTED") => {
                EngineError::QuotaExhausted { message: brief }
            }
            _ => EngineError::ApiRequest {
                message: format!("HTTP {status} from Gemini API: {brief}"),
            },
        }
    }

    /// One text-in/text-out `generateContent` call.
    async fn generate_text(&self, prompt: &str) -> Result<String, EngineError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key()?
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Connection {
                message: e.to_string(),
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| EngineError::Connection {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(self.map_http_error(status, &text));
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| EngineError::ResponseParse {
                message: e.to_string(),
            })?;
        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::ResponseParse {
                message: "no text candidate in Gemini response".to_string(),
            })
    }

    /// Split a model reply into clean list items, stripping bullets and
    /// numbering.
    fn parse_list(text: &str) -> Vec<String> {
        text.lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(['-', '*', '•'])
                    .trim_start_matches(|c: char| c.is_ascii_digit())
                    .trim_start_matches(['.', ')'])
                    .trim()
            })
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Expansion used when the model call fails: split comparatives, then
    /// pad with standard research angles.
    fn heuristic_sub_queries(query: &str, breadth: usize) -> Vec<String> {
        let mut subs: Vec<String> = Vec::new();
        for sep in [" vs ", " versus ", " compared to "] {
            if query.contains(sep) {
                subs.extend(
                    query
                        .split(sep)
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty()),
                );
                break;
            }
        }
        let angles = [
            format!("Key concepts behind: {query}"),
            format!("Recent developments in: {query}"),
            format!("Practical applications of: {query}"),
            format!("Limitations and open problems of: {query}"),
        ];
        for angle in angles {
            if subs.len() >= breadth {
                break;
            }
            subs.push(angle);
        }
        subs.truncate(breadth);
        subs
    }

    /// How many learnings each node asks for.
    fn learnings_per_node(&self) -> usize {
        match self.mode {
            ResearchMode::Fast => 2,
            ResearchMode::Balanced => 3,
            ResearchMode::Comprehensive => 4,
        }
    }

    async fn expand(&self, query: &str, breadth: usize) -> Result<Vec<String>, EngineError> {
        let prompt = format!(
            "You are planning a research task. Break the query below into at most \
             {breadth} distinct, independently researchable sub-queries. Return one \
             sub-query per line with no numbering and no commentary.\n\nQuery: {query}"
        );
        match self.generate_text(&prompt).await {
            Ok(text) => {
                let mut subs = Self::parse_list(&text);
                subs.truncate(breadth);
                Ok(subs)
            }
            Err(err) if err.is_quota() => Err(err),
            Err(err) => {
                warn!(error = %err, "sub-query expansion failed, using heuristic split");
                Ok(Self::heuristic_sub_queries(query, breadth))
            }
        }
    }

    /// Learnings plus source suggestions for one sub-query.
    ///
    /// Sources are the model's suggestions of likely authoritative
    /// references, not fetched documents — best-effort by construction.
    async fn investigate(
        &self,
        query: &str,
    ) -> Result<(Vec<String>, Vec<SourceEntry>), EngineError> {
        let want = self.learnings_per_node();
        let prompt = format!(
            "Research the query below. Reply with up to {want} concise factual \
             learnings, one per line. After them, list up to 2 likely authoritative \
             sources as lines of the form 'SOURCE: Title | https://url'.\n\nQuery: {query}"
        );
        let text = self.generate_text(&prompt).await?;
        let mut learnings = Vec::new();
        let mut sources = Vec::new();
        for item in Self::parse_list(&text) {
            if let Some(rest) = item.strip_prefix("SOURCE:") {
                if let Some((title, link)) = rest.split_once('|') {
                    sources.push(SourceEntry {
                        title: title.trim().to_string(),
                        link: link.trim().to_string(),
                    });
                }
            } else if learnings.len() < want {
                learnings.push(item);
            }
        }
        Ok((learnings, sources))
    }

    fn write_snapshot(&self, nodes: &[FlatNode]) {
        let tree = assemble(nodes);
        if let Err(err) = persistence::atomic_write_json(&self.snapshot_path, &tree) {
            warn!(
                path = %self.snapshot_path.display(),
                error = %err,
                "snapshot write failed"
            );
        }
    }
}

/// Rebuild the nested tree from the arena.
///
/// Children always have higher indices than their parent, so walking the
/// arena backwards completes every child list before its parent is built.
fn assemble(nodes: &[FlatNode]) -> QueryNode {
    let mut pending: HashMap<usize, Vec<QueryNode>> = HashMap::new();
    for i in (0..nodes.len()).rev() {
        let flat = &nodes[i];
        let mut children = pending.remove(&i).unwrap_or_default();
        children.reverse();
        let node = QueryNode {
            query: flat.query.clone(),
            status: flat.status,
            learnings: flat.learnings.clone(),
            sub_queries: children,
            id: Some(flat.id.clone()),
            depth: Some(flat.depth),
        };
        match flat.parent {
            Some(parent) => pending.entry(parent).or_default().push(node),
            None => return node,
        }
    }
    QueryNode::default()
}

#[async_trait]
impl ResearchCollaborator for GeminiCollaborator {
    async fn run_research(
        &self,
        query: &str,
        breadth: u32,
        depth: u32,
    ) -> Result<ResearchOutcome, EngineError> {
        let mut nodes = vec![FlatNode {
            query: query.to_string(),
            status: QueryStatus::InProgress,
            learnings: Vec::new(),
            id: Uuid::new_v4().to_string(),
            depth: 1,
            parent: None,
        }];
        self.write_snapshot(&nodes);

        let mut all_learnings: Vec<String> = Vec::new();
        let mut all_sources: HashMap<String, SourceEntry> = HashMap::new();
        let mut frontier: Vec<usize> = vec![0];

        for level in 1..=depth.max(1) {
            let mut next_frontier: Vec<usize> = Vec::new();
            // Halve the fan-out on every level, like the depth parameter
            // promises: broad at the top, narrow at the bottom.
            let fan_out = (breadth >> (level - 1)).max(1) as usize;

            for idx in frontier {
                nodes[idx].status = QueryStatus::InProgress;
                self.write_snapshot(&nodes);

                let question = nodes[idx].query.clone();
                let investigated = self.investigate(&question).await;
                match investigated {
                    Ok((learnings, sources)) => {
                        all_learnings.extend(learnings.iter().cloned());
                        for source in sources {
                            if !source.link.is_empty() {
                                all_sources.insert(source.link.clone(), source);
                            }
                        }
                        nodes[idx].learnings = learnings;
                    }
                    Err(err) if err.is_quota() => return Err(err),
                    Err(err) => {
                        debug!(error = %err, query = %question, "node investigation failed");
                    }
                }

                if level < depth && nodes.len() < NODE_BUDGET {
                    let remaining = NODE_BUDGET - nodes.len();
                    let subs = self.expand(&question, fan_out.min(remaining)).await?;
                    for sub in subs {
                        nodes.push(FlatNode {
                            query: sub,
                            status: QueryStatus::Waiting,
                            learnings: Vec::new(),
                            id: Uuid::new_v4().to_string(),
                            depth: level + 1,
                            parent: Some(idx),
                        });
                        next_frontier.push(nodes.len() - 1);
                    }
                }

                nodes[idx].status = QueryStatus::Completed;
                self.write_snapshot(&nodes);
            }

            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        Ok(ResearchOutcome {
            learnings: all_learnings,
            sources: all_sources,
        })
    }

    async fn generate_follow_ups(&self, query: &str) -> Result<Vec<String>, EngineError> {
        let prompt = format!(
            "You are refining a research task. Ask up to 3 short follow-up questions \
             that would sharpen the focus of the research query below. Return one \
             question per line with no numbering.\n\nQuery: {query}"
        );
        let text = self.generate_text(&prompt).await?;
        let mut questions = Self::parse_list(&text);
        questions.truncate(3);
        Ok(questions)
    }

    async fn generate_report(
        &self,
        query: &str,
        learnings: &[String],
        sources: &HashMap<String, SourceEntry>,
    ) -> Result<String, EngineError> {
        let learning_lines: Vec<String> =
            learnings.iter().map(|l| format!("- {l}")).collect();
        let source_lines: Vec<String> = sources
            .values()
            .map(|s| format!("- {} ({})", s.title, s.link))
            .collect();
        let prompt = format!(
            "Write a detailed research report in markdown answering the query below. \
             Ground the report in the collected learnings; cite the sources where \
             relevant.\n\nQuery: {query}\n\nLearnings:\n{}\n\nSources:\n{}",
            learning_lines.join("\n"),
            source_lines.join("\n"),
        );
        self.generate_text(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_collaborator() -> GeminiCollaborator {
        GeminiCollaborator::from_settings(&ResearchSettings::default(), ResearchMode::Balanced)
            .unwrap()
    }

    #[test]
    fn test_parse_list_strips_markers() {
        let text = "- first item\n2. second item\n\n* third item\n";
        assert_eq!(
            GeminiCollaborator::parse_list(text),
            vec!["first item", "second item", "third item"]
        );
    }

    #[test]
    fn test_heuristic_split_comparative() {
        let subs = GeminiCollaborator::heuristic_sub_queries("Redis vs Memcached", 4);
        assert_eq!(subs.len(), 4);
        assert_eq!(subs[0], "Redis");
        assert_eq!(subs[1], "Memcached");
    }

    #[test]
    fn test_heuristic_split_respects_breadth() {
        let subs = GeminiCollaborator::heuristic_sub_queries("quantum error correction", 2);
        assert_eq!(subs.len(), 2);
        assert!(subs[0].contains("quantum error correction"));
    }

    #[test]
    fn test_assemble_rebuilds_nested_tree() {
        let nodes = vec![
            FlatNode {
                query: "root".into(),
                status: QueryStatus::Completed,
                learnings: vec!["r".into()],
                id: "0".into(),
                depth: 1,
                parent: None,
            },
            FlatNode {
                query: "a".into(),
                status: QueryStatus::Completed,
                learnings: vec![],
                id: "1".into(),
                depth: 2,
                parent: Some(0),
            },
            FlatNode {
                query: "b".into(),
                status: QueryStatus::Waiting,
                learnings: vec![],
                id: "2".into(),
                depth: 2,
                parent: Some(0),
            },
            FlatNode {
                query: "a1".into(),
                status: QueryStatus::Waiting,
                learnings: vec![],
                id: "3".into(),
                depth: 3,
                parent: Some(1),
            },
        ];

        let tree = assemble(&nodes);

        assert_eq!(tree.query, "root");
        assert_eq!(tree.sub_queries.len(), 2);
        assert_eq!(tree.sub_queries[0].query, "a");
        assert_eq!(tree.sub_queries[1].query, "b");
        assert_eq!(tree.sub_queries[0].sub_queries[0].query, "a1");
        assert_eq!(tree.sub_queries[0].sub_queries[0].depth, Some(3));
    }

    #[test]
    fn test_map_http_error_quota() {
        let c = test_collaborator();
        let err = c.map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_quota());

        let err = c.map_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            "{\"error\": {\"status\": \"RESOURCE_EXHAUSTED\"}}",
        );
        assert!(err.is_quota());

        let err = c.map_http_error(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, EngineError::AuthFailed { .. }));

        let err = c.map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, EngineError::ApiRequest { .. }));
    }

    #[test]
    fn test_learnings_per_node_by_mode() {
        let settings = ResearchSettings::default();
        let fast = GeminiCollaborator::from_settings(&settings, ResearchMode::Fast).unwrap();
        let deep =
            GeminiCollaborator::from_settings(&settings, ResearchMode::Comprehensive).unwrap();
        assert_eq!(fast.learnings_per_node(), 2);
        assert_eq!(deep.learnings_per_node(), 4);
    }
}
