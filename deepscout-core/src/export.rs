//! Artifact export — run directories, reports, summaries, graph pages.
//!
//! Every artifact is write-once with a timestamp-suffixed filename; nothing
//! here mutates earlier artifacts. HTML pages are static: the report page
//! renders its embedded markdown client-side, and the graph page embeds the
//! extracted node/link arrays for a client-side force layout. No layout is
//! computed on this side.

use crate::graph::GraphModel;
use crate::persistence;
use crate::tree::{self, QueryNode, SourceEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Artifact kinds surfaced to the operator as they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TreeArchive,
    Summary,
    Report,
    ReportHtml,
    Graph,
}

impl ArtifactKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ArtifactKind::TreeArchive => "research tree archive",
            ArtifactKind::Summary => "research summary",
            ArtifactKind::Report => "final report",
            ArtifactKind::ReportHtml => "report HTML view",
            ArtifactKind::Graph => "knowledge graph",
        }
    }
}

/// Directory family for run artifacts.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    base: PathBuf,
}

impl OutputPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn reports(&self) -> PathBuf {
        self.base.join("reports")
    }

    pub fn trees(&self) -> PathBuf {
        self.base.join("trees")
    }

    pub fn graphs(&self) -> PathBuf {
        self.base.join("graphs")
    }

    pub fn summaries(&self) -> PathBuf {
        self.base.join("summaries")
    }

    /// Create the full directory family.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [
            self.base.clone(),
            self.reports(),
            self.trees(),
            self.graphs(),
            self.summaries(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Build a filesystem-safe slug from free text.
///
/// Keeps alphanumerics, spaces, and underscores; spaces become
/// underscores; overlong input is cut with an ellipsis marker.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    let safe: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .replace(' ', "_");
    match safe.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &safe[..idx]),
        None => safe,
    }
}

/// Timestamp suffix shared by all artifact filenames.
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Format elapsed seconds as `2h 3m 4s` / `3m 4s` / `45s`.
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Archive a final tree snapshot as a timestamped copy.
pub fn archive_tree(paths: &OutputPaths, node: &QueryNode) -> io::Result<PathBuf> {
    let path = paths
        .trees()
        .join(format!("research_tree_{}.json", timestamp_slug(Utc::now())));
    persistence::atomic_write_json(&path, node)?;
    Ok(path)
}

/// Duration block of the summary metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDuration {
    pub minutes: u64,
    pub seconds: u64,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMeta {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub duration: SummaryDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_queries: usize,
    pub completed_queries: usize,
    pub completion_rate: f64,
    pub total_learnings: usize,
    pub total_sources: usize,
}

/// The research summary document persisted after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub meta: SummaryMeta,
    pub statistics: SummaryStatistics,
    pub research_tree: Option<QueryNode>,
    pub learnings: Vec<String>,
    pub sources: HashMap<String, SourceEntry>,
}

/// Assemble the summary document from the run's accumulated state.
pub fn build_summary(
    query: &str,
    research_tree: Option<QueryNode>,
    sources: HashMap<String, SourceEntry>,
    learnings: Vec<String>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> ResearchSummary {
    let total_seconds = (ended_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
    let count = tree::count_nodes(research_tree.as_ref());
    let completion_rate = if count.total > 0 {
        count.completed as f64 / count.total as f64
    } else {
        0.0
    };
    ResearchSummary {
        meta: SummaryMeta {
            timestamp: ended_at,
            query: query.to_string(),
            duration: SummaryDuration {
                minutes: total_seconds as u64 / 60,
                seconds: total_seconds as u64 % 60,
                total_seconds,
            },
        },
        statistics: SummaryStatistics {
            total_queries: count.total,
            completed_queries: count.completed,
            completion_rate,
            total_learnings: tree::count_knowledge_points(research_tree.as_ref()),
            total_sources: tree::count_unique_sources(&sources),
        },
        research_tree,
        learnings,
        sources,
    }
}

/// Persist the summary document.
pub fn export_summary(paths: &OutputPaths, summary: &ResearchSummary) -> io::Result<PathBuf> {
    let slug = sanitize_filename(&summary.meta.query, 30);
    let path = paths.summaries().join(format!(
        "research_summary_{}_{}.json",
        slug,
        timestamp_slug(summary.meta.timestamp)
    ));
    persistence::atomic_write_json(&path, summary)?;
    Ok(path)
}

/// Save the report markdown under a sanitized, timestamped filename.
pub fn save_report(paths: &OutputPaths, query: &str, report: &str) -> io::Result<PathBuf> {
    let slug = sanitize_filename(query, 50);
    let path = paths
        .reports()
        .join(format!("report_{}_{}.md", slug, timestamp_slug(Utc::now())));
    persistence::atomic_write(&path, report.as_bytes())?;
    Ok(path)
}

/// Escape text for embedding inside a JS template literal.
fn escape_js_template(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

/// Minimal HTML escaping for text interpolated into markup.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Research report: __TITLE__</title>
    <style>
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 900px;
            margin: 0 auto;
            padding: 20px;
        }
        h1, h2, h3, h4, h5, h6 { color: #2c3e50; margin-top: 1.5em; }
        a { color: #3498db; text-decoration: none; }
        a:hover { text-decoration: underline; }
        code { background-color: #f8f8f8; padding: 2px 4px; border-radius: 3px; }
        pre { background-color: #f8f8f8; padding: 15px; border-radius: 5px; overflow-x: auto; }
        blockquote { border-left: 4px solid #3498db; padding-left: 15px; margin-left: 0; color: #666; }
        table { border-collapse: collapse; width: 100%; margin: 20px 0; }
        th, td { padding: 12px; border: 1px solid #ddd; text-align: left; }
        th { background-color: #f2f2f2; }
        .date { color: #7f8c8d; font-style: italic; }
    </style>
</head>
<body>
    <div class="date">__DATE__</div>
    <div id="content"></div>
    <script src="https://cdnjs.cloudflare.com/ajax/libs/markdown-it/12.3.2/markdown-it.min.js"></script>
    <script>
    window.onload = function() {
        const md = window.markdownit({ html: true, linkify: true, typographer: true });
        const markdownContent = `__MARKDOWN__`;
        document.getElementById('content').innerHTML = md.render(markdownContent);
    };
    </script>
</body>
</html>
"#;

/// Render the report as a static HTML page with a client-side markdown
/// renderer, written next to nothing else — it gets its own timestamped
/// file in the reports directory.
pub fn export_report_html(paths: &OutputPaths, query: &str, report: &str) -> io::Result<PathBuf> {
    let slug = sanitize_filename(query, 50);
    let path = paths
        .reports()
        .join(format!("report_{}_{}.html", slug, timestamp_slug(Utc::now())));
    let html = REPORT_TEMPLATE
        .replace("__TITLE__", &escape_html(query))
        .replace("__DATE__", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string())
        .replace("__MARKDOWN__", &escape_js_template(report));
    persistence::atomic_write(&path, html.as_bytes())?;
    Ok(path)
}

const GRAPH_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Knowledge graph</title>
    <script src="https://d3js.org/d3.v7.min.js"></script>
    <style>
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 0; overflow: hidden; background-color: #f8f9fa; }
        #graph { width: 100vw; height: 100vh; }
        .node { stroke: #fff; stroke-width: 1.5px; }
        .link { stroke: #999; stroke-opacity: 0.6; }
        .node-query { fill: #3498db; }
        .node-learning { fill: #2ecc71; }
        .node-source { fill: #e74c3c; }
        .status-completed { stroke: #2ecc71; stroke-width: 3px; }
        .status-in_progress { stroke: #f39c12; stroke-width: 3px; }
        .status-waiting { stroke: #95a5a6; stroke-width: 3px; }
        .tooltip {
            position: absolute; background-color: rgba(0, 0, 0, 0.8); color: white;
            padding: 10px; border-radius: 5px; font-size: 14px; max-width: 300px;
            pointer-events: none; opacity: 0; transition: opacity 0.3s;
        }
    </style>
</head>
<body>
    <div id="graph"></div>
    <div class="tooltip" id="tooltip"></div>
    <script>
        const nodes = __NODES__;
        const links = __LINKS__;

        const width = window.innerWidth;
        const height = window.innerHeight;
        const tooltip = d3.select("#tooltip");

        const svg = d3.select("#graph").append("svg")
            .attr("width", width).attr("height", height);
        const g = svg.append("g");
        svg.call(d3.zoom().scaleExtent([0.1, 4]).on("zoom", (event) => {
            g.attr("transform", event.transform);
        }));

        const simulation = d3.forceSimulation(nodes)
            .force("link", d3.forceLink(links).id(d => d.id).distance(100))
            .force("charge", d3.forceManyBody().strength(-300))
            .force("center", d3.forceCenter(width / 2, height / 2))
            .force("collision", d3.forceCollide().radius(50));

        const link = g.append("g").selectAll("line").data(links).enter()
            .append("line").attr("class", "link").attr("stroke-width", d => d.value);

        const node = g.append("g").selectAll("circle").data(nodes).enter()
            .append("circle")
            .attr("class", d => `node node-${d.type} status-${d.status || 'normal'}`)
            .attr("r", d => d.type === "query" ? 15 : (d.type === "source" ? 12 : 8))
            .on("mouseover", function(event, d) {
                tooltip.style("opacity", 1)
                    .html(`<strong>${d.type}</strong><br>${d.full_text || d.label}`)
                    .style("left", (event.pageX + 10) + "px")
                    .style("top", (event.pageY - 20) + "px");
            })
            .on("mouseout", () => tooltip.style("opacity", 0))
            .on("click", (event, d) => {
                if (d.type === "source" && d.url) { window.open(d.url, '_blank'); }
            });

        const text = g.append("g").selectAll("text").data(nodes).enter()
            .append("text")
            .text(d => d.label.length > 20 ? d.label.substring(0, 20) + "..." : d.label)
            .attr("dy", 25).attr("text-anchor", "middle").attr("font-size", "10px");

        simulation.on("tick", () => {
            link.attr("x1", d => d.source.x).attr("y1", d => d.source.y)
                .attr("x2", d => d.target.x).attr("y2", d => d.target.y);
            node.attr("cx", d => d.x).attr("cy", d => d.y);
            text.attr("x", d => d.x).attr("y", d => d.y);
        });
    </script>
</body>
</html>
"##;

/// Write the knowledge-graph page with the model embedded as inline
/// node/link arrays.
pub fn export_graph_html(paths: &OutputPaths, model: &GraphModel) -> io::Result<PathBuf> {
    let path = paths
        .graphs()
        .join(format!("knowledge_graph_{}.html", timestamp_slug(Utc::now())));
    let nodes = serde_json::to_string(&model.nodes).map_err(io::Error::other)?;
    let links = serde_json::to_string(&model.links).map_err(io::Error::other)?;
    let html = GRAPH_TEMPLATE
        .replace("__NODES__", &nodes)
        .replace("__LINKS__", &links);
    persistence::atomic_write(&path, html.as_bytes())?;
    Ok(path)
}
