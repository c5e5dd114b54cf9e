//! Knowledge-graph extraction from a query tree and visited sources.
//!
//! Produces the node/link model embedded into the exported graph page:
//! one `query` node per distinct tree node id, one `learning` node per
//! knowledge point, one `source` node per visited-source entry.
//!
//! Source→learning links pair the i-th source with the i-th collected
//! learning. That is a display approximation, not a verified citation
//! mapping, and must be read as best-effort.

use crate::tree::{QueryNode, QueryStatus, SourceEntry};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Kind of graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Query,
    Learning,
    Source,
}

/// One node in the exported graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Untruncated text, retained on learning nodes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

/// A directed link between two graph nodes.
///
/// Serialized with the `value` key the force-layout template expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    #[serde(rename = "value")]
    pub weight: u32,
}

/// The derived graph model. Rebuilt fresh on every export call; ids carry
/// no identity across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

const MAX_LABEL_CHARS: usize = 100;

/// Truncate a label for display, respecting UTF-8 boundaries.
fn display_label(text: &str) -> String {
    match text.char_indices().nth(MAX_LABEL_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Extract the graph model from a tree snapshot and the visited sources.
///
/// An empty tree yields an empty model. A tree node id that is reachable
/// more than once (overlapping partial snapshots re-written by the
/// producer) is emitted as a single `query` node, but every parent edge
/// into it is kept, preserving link multiplicity.
pub fn extract(tree: Option<&QueryNode>, sources: &HashMap<String, SourceEntry>) -> GraphModel {
    let mut model = GraphModel::default();
    let mut seen: HashSet<String> = HashSet::new();
    // Learning node ids in collection order, for the index-pairing below.
    let mut learning_ids: Vec<String> = Vec::new();

    let mut queue: VecDeque<(&QueryNode, Option<String>)> = VecDeque::new();
    if let Some(root) = tree {
        queue.push_back((root, None));
    }

    while let Some((node, parent_id)) = queue.pop_front() {
        let node_id = node
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Dedup applies to node emission only, never to link emission.
        if seen.insert(node_id.clone()) {
            model.nodes.push(GraphNode {
                id: node_id.clone(),
                label: display_label(&node.query),
                kind: NodeKind::Query,
                status: Some(node.status),
                url: None,
                full_text: None,
            });

            for (i, learning) in node.learnings.iter().enumerate() {
                let learning_id = format!("learning_{node_id}_{i}");
                model.nodes.push(GraphNode {
                    id: learning_id.clone(),
                    label: display_label(learning),
                    kind: NodeKind::Learning,
                    status: None,
                    url: None,
                    full_text: Some(learning.clone()),
                });
                model.links.push(GraphLink {
                    source: node_id.clone(),
                    target: learning_id.clone(),
                    weight: 1,
                });
                learning_ids.push(learning_id);
            }
        }

        if let Some(parent) = parent_id {
            model.links.push(GraphLink {
                source: parent,
                target: node_id.clone(),
                weight: 2,
            });
        }

        for child in &node.sub_queries {
            queue.push_back((child, Some(node_id.clone())));
        }
    }

    // Sources are keyed by an opaque identifier; sort for a stable layout.
    let mut keys: Vec<&String> = sources.keys().collect();
    keys.sort();
    for (i, key) in keys.into_iter().enumerate() {
        let entry = &sources[key];
        let source_id = format!("source_{i}");
        model.nodes.push(GraphNode {
            id: source_id.clone(),
            label: display_label(&entry.title),
            kind: NodeKind::Source,
            status: None,
            url: Some(entry.link.clone()),
            full_text: None,
        });
        // Best-effort pairing: i-th source to i-th learning. Sources past
        // the end of the learnings list keep their node but no link.
        if let Some(learning_id) = learning_ids.get(i) {
            model.links.push(GraphLink {
                source: source_id,
                target: learning_id.clone(),
                weight: 1,
            });
        }
    }

    model
}
