//! Query-tree data model and aggregation.
//!
//! The tree is produced and owned by the research collaborator; this module
//! only reads snapshots of it. All aggregation walks the tree iteratively
//! with an explicit work queue so arbitrarily deep trees (the depth
//! parameter is operator-controlled) cannot exhaust the call stack.
//!
//! Aggregation is order-independent over the node set, so traversal order
//! never affects results.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Completion status of a query node.
///
/// A node moves to `Completed` exactly once and never regresses; the
/// consumer treats the status as read-only either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
}

/// One node of the recursive query tree.
///
/// Snapshots written by the collaborator may omit any field; absent fields
/// decode to safe defaults so a structurally odd node degrades instead of
/// failing the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryNode {
    /// The query text this node explores.
    #[serde(default)]
    pub query: String,
    /// Completion status; absent means not completed.
    #[serde(default)]
    pub status: QueryStatus,
    /// Knowledge points accumulated for this query.
    #[serde(default)]
    pub learnings: Vec<String>,
    /// Recursively spawned sub-queries, in insertion order.
    #[serde(default)]
    pub sub_queries: Vec<QueryNode>,
    /// Stable identity; synthesized downstream when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Level in the tree as reported by the producer (root = 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// A visited source, keyed externally by an opaque URL-derived identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
}

/// Total and completed node counts for a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCount {
    pub total: usize,
    pub completed: usize,
}

/// Count the nodes reachable from the root (root included) and how many
/// of them are completed. An empty tree yields `(0, 0)`.
pub fn count_nodes(tree: Option<&QueryNode>) -> NodeCount {
    let mut count = NodeCount::default();
    let mut queue: VecDeque<&QueryNode> = VecDeque::new();
    if let Some(root) = tree {
        queue.push_back(root);
    }
    while let Some(node) = queue.pop_front() {
        count.total += 1;
        if node.status == QueryStatus::Completed {
            count.completed += 1;
        }
        queue.extend(node.sub_queries.iter());
    }
    count
}

/// Sum of knowledge points (learnings) over all nodes. Empty tree yields 0.
pub fn count_knowledge_points(tree: Option<&QueryNode>) -> usize {
    let mut total = 0;
    let mut queue: VecDeque<&QueryNode> = VecDeque::new();
    if let Some(root) = tree {
        queue.push_back(root);
    }
    while let Some(node) = queue.pop_front() {
        total += node.learnings.len();
        queue.extend(node.sub_queries.iter());
    }
    total
}

/// Deepest level reached in the tree, counting the root as 1.
///
/// Prefers a node's producer-reported `depth` when present, falling back
/// to the structural level otherwise. Empty tree yields 0.
pub fn max_depth(tree: Option<&QueryNode>) -> usize {
    let mut deepest = 0;
    let mut queue: VecDeque<(&QueryNode, usize)> = VecDeque::new();
    if let Some(root) = tree {
        queue.push_back((root, 1));
    }
    while let Some((node, level)) = queue.pop_front() {
        let level = node.depth.map(|d| d as usize).unwrap_or(level);
        deepest = deepest.max(level);
        for child in &node.sub_queries {
            queue.push_back((child, level + 1));
        }
    }
    deepest
}

/// Cardinality of the visited-source map. Empty map yields 0.
pub fn count_unique_sources(sources: &HashMap<String, SourceEntry>) -> usize {
    sources.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(status: QueryStatus, learnings: &[&str], sub_queries: Vec<QueryNode>) -> QueryNode {
        QueryNode {
            query: "q".into(),
            status,
            learnings: learnings.iter().map(|s| s.to_string()).collect(),
            sub_queries,
            id: None,
            depth: None,
        }
    }

    #[test]
    fn test_count_nodes_empty() {
        assert_eq!(count_nodes(None), NodeCount::default());
    }

    #[test]
    fn test_count_nodes_mixed_statuses() {
        let tree = node(
            QueryStatus::Completed,
            &[],
            vec![
                node(QueryStatus::Completed, &[], vec![]),
                node(QueryStatus::Waiting, &[], vec![]),
            ],
        );
        let count = count_nodes(Some(&tree));
        assert_eq!(count.total, 3);
        assert_eq!(count.completed, 2);
        assert!(count.total >= count.completed);
    }

    #[test]
    fn test_count_knowledge_points() {
        let tree = node(
            QueryStatus::Completed,
            &["a", "b"],
            vec![node(QueryStatus::InProgress, &["c"], vec![])],
        );
        assert_eq!(count_knowledge_points(Some(&tree)), 3);
        assert_eq!(count_knowledge_points(None), 0);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let tree = node(
            QueryStatus::Completed,
            &["a"],
            vec![node(QueryStatus::Waiting, &["b", "c"], vec![])],
        );
        let first = (count_nodes(Some(&tree)), count_knowledge_points(Some(&tree)));
        let second = (count_nodes(Some(&tree)), count_knowledge_points(Some(&tree)));
        assert_eq!(first, second);
    }

    #[test]
    fn test_deep_tree_does_not_overflow_stack() {
        // A path-shaped tree far deeper than any default thread stack
        // would tolerate under recursion.
        let mut tree = node(QueryStatus::Completed, &["leaf"], vec![]);
        for _ in 0..100_000 {
            tree = node(QueryStatus::Completed, &[], vec![tree]);
        }
        let count = count_nodes(Some(&tree));
        assert_eq!(count.total, 100_001);
        assert_eq!(count.completed, 100_001);
        assert_eq!(count_knowledge_points(Some(&tree)), 1);
        assert_eq!(max_depth(Some(&tree)), 100_001);
        // Drop iteratively too; a recursive Drop on a 100k-deep chain
        // would also blow the stack.
        let mut current = tree;
        while let Some(child) = current.sub_queries.pop() {
            current = child;
        }
    }

    #[test]
    fn test_max_depth_prefers_producer_depth() {
        let mut child = node(QueryStatus::Waiting, &[], vec![]);
        child.depth = Some(7);
        let tree = node(QueryStatus::Completed, &[], vec![child]);
        assert_eq!(max_depth(Some(&tree)), 7);
        assert_eq!(max_depth(None), 0);
    }

    #[test]
    fn test_count_unique_sources() {
        let mut sources = HashMap::new();
        assert_eq!(count_unique_sources(&sources), 0);
        for i in 0..4 {
            sources.insert(
                format!("https://example.com/{i}"),
                SourceEntry {
                    title: format!("Source {i}"),
                    link: format!("https://example.com/{i}"),
                },
            );
        }
        assert_eq!(count_unique_sources(&sources), 4);
    }

    #[test]
    fn test_tolerant_decoding_of_sparse_nodes() {
        // Only the query is present; everything else defaults.
        let tree: QueryNode =
            serde_json::from_str(r#"{"query": "bare", "sub_queries": [{}]}"#).unwrap();
        assert_eq!(tree.status, QueryStatus::Waiting);
        assert!(tree.learnings.is_empty());
        let count = count_nodes(Some(&tree));
        assert_eq!(count.total, 2);
        assert_eq!(count.completed, 0);
    }
}
