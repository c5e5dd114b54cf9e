//! Interactive prompts and terminal feedback for a research run.
//!
//! All operator interaction goes through here: the run-configuration
//! wizard, the follow-up/confirmation callback the controller drives, and
//! the one-line dashboard fed by the progress channel.

use deepscout_core::export::{ArtifactKind, format_elapsed};
use deepscout_core::progress::ProgressObserver;
use deepscout_core::state::RunStats;
use deepscout_core::workflow::{
    RunOutcome, RunPhase, RunRequest, WorkflowCallback, WorkflowNotice,
};
use deepscout_core::{ResearchMode, ScoutConfig};
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

pub fn print_banner() {
    println!();
    println!("  deepscout — deep-research laboratory");
    println!("  ------------------------------------");
}

/// Collect query text and run parameters.
///
/// Numeric inputs re-prompt on bad values instead of propagating a parse
/// error; bounds keep a typo from fanning out hundreds of sub-queries.
pub fn collect_run_request(
    query: Option<String>,
    config: &ScoutConfig,
) -> anyhow::Result<RunRequest> {
    let query = match query {
        Some(q) => q,
        None => Input::new()
            .with_prompt("Research query")
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.trim().is_empty() {
                    Err("query cannot be empty")
                } else {
                    Ok(())
                }
            })
            .interact_text()?,
    };

    let labels: Vec<String> = ResearchMode::ALL
        .iter()
        .map(|m| format!("{m} — {}", m.describe()))
        .collect();
    let default_idx = ResearchMode::ALL
        .iter()
        .position(|m| *m == config.research.mode)
        .unwrap_or(0);
    let selection = Select::new()
        .with_prompt("Research mode")
        .items(&labels)
        .default(default_idx)
        .interact()?;
    let mode = ResearchMode::ALL[selection];

    let breadth: u32 = Input::new()
        .with_prompt("Search breadth (parallel sub-queries)")
        .default(config.research.default_breadth)
        .validate_with(|v: &u32| -> Result<(), &str> {
            if (1..=20).contains(v) {
                Ok(())
            } else {
                Err("breadth must be between 1 and 20")
            }
        })
        .interact_text()?;

    let depth: u32 = Input::new()
        .with_prompt("Search depth (exploration levels)")
        .default(config.research.default_depth)
        .validate_with(|v: &u32| -> Result<(), &str> {
            if (1..=10).contains(v) {
                Ok(())
            } else {
                Err("depth must be between 1 and 10")
            }
        })
        .interact_text()?;

    Ok(RunRequest {
        query,
        mode,
        breadth,
        depth,
    })
}

/// Prints progress-channel updates as single dashboard lines.
pub struct TerminalDashboard {
    quiet: bool,
    announced_waiting: AtomicBool,
}

impl TerminalDashboard {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            announced_waiting: AtomicBool::new(false),
        }
    }
}

impl ProgressObserver for TerminalDashboard {
    fn on_tree_update(&self, stats: &RunStats) {
        if self.quiet {
            return;
        }
        println!(
            "  [{}] {}/{} queries complete · depth {} · {} learnings · {} sources",
            format_elapsed(stats.elapsed_secs),
            stats.completed_queries,
            stats.total_queries,
            stats.current_depth,
            stats.knowledge_points,
            stats.unique_sources,
        );
    }

    fn on_waiting(&self) {
        // Announce the loading state once, not every tick.
        if !self.quiet && !self.announced_waiting.swap(true, Ordering::Relaxed) {
            println!("  Waiting for the first research snapshot...");
        }
    }
}

/// Workflow callback backed by dialoguer prompts.
pub struct TerminalCallback {
    quiet: bool,
}

impl TerminalCallback {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn say(&self, line: &str) {
        if !self.quiet {
            println!("{line}");
        }
    }

    fn offer_to_open(&self, path: &Path) {
        if self.quiet {
            return;
        }
        let open_it = Confirm::new()
            .with_prompt("Open it in your browser?")
            .default(true)
            .interact()
            .unwrap_or(false);
        if open_it && let Err(err) = open::that(path) {
            warn!(path = %path.display(), error = %err, "could not open artifact");
            println!("  Could not open {}: {err}", path.display());
        }
    }
}

#[async_trait::async_trait]
impl WorkflowCallback for TerminalCallback {
    async fn on_phase_change(&self, phase: RunPhase) {
        let line = match phase {
            RunPhase::GeneratingFollowUps => "  Generating follow-up questions...",
            RunPhase::Searching => "  Launching deep research...",
            RunPhase::ReportGeneration => "  Generating the final report...",
            RunPhase::GraphGeneration => "  Generating the knowledge graph...",
            RunPhase::Done => "  Research run complete.",
            RunPhase::FailedFatal => "  Research run aborted.",
            _ => return,
        };
        self.say(line);
    }

    async fn answer_follow_up(&self, index: usize, total: usize, question: &str) -> String {
        if self.quiet {
            return String::new();
        }
        Input::new()
            .with_prompt(format!("[{index}/{total}] {question}"))
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default()
    }

    async fn confirm_report(&self) -> bool {
        if self.quiet {
            return true;
        }
        Confirm::new()
            .with_prompt("Generate the final report?")
            .default(true)
            .interact()
            .unwrap_or(false)
    }

    async fn confirm_graph(&self) -> bool {
        if self.quiet {
            return true;
        }
        Confirm::new()
            .with_prompt("Generate the knowledge graph?")
            .default(true)
            .interact()
            .unwrap_or(false)
    }

    async fn on_notice(&self, notice: &WorkflowNotice) {
        match notice {
            WorkflowNotice::FollowUpsUnavailable { reason } => {
                self.say(&format!(
                    "  Follow-up questions unavailable ({reason}); continuing without them."
                ));
            }
            WorkflowNotice::ResearchFailed { reason } => {
                self.say(&format!(
                    "  Research call failed ({reason}); partial progress is kept."
                ));
            }
            WorkflowNotice::QuotaExhausted { reason } => {
                self.say(&format!(
                    "  Gemini quota exhausted ({reason}). Check your plan and billing, then retry."
                ));
            }
            WorkflowNotice::ArtifactFailed { kind, reason } => {
                self.say(&format!("  Could not write {} ({reason}).", kind.describe()));
            }
        }
    }

    async fn on_artifact_saved(&self, kind: ArtifactKind, path: &Path) {
        self.say(&format!("  Saved {}: {}", kind.describe(), path.display()));
        if matches!(kind, ArtifactKind::ReportHtml | ArtifactKind::Graph) {
            self.offer_to_open(path);
        }
    }
}

/// Final stats block printed after a run.
pub fn print_run_summary(outcome: &RunOutcome) {
    let stats = &outcome.stats;
    println!();
    println!("  Total queries:      {}", stats.total_queries);
    println!("  Completed queries:  {}", stats.completed_queries);
    println!(
        "  Completion rate:    {:.0}%",
        stats.completion_rate * 100.0
    );
    println!("  Knowledge points:   {}", stats.knowledge_points);
    println!("  Sources found:      {}", stats.unique_sources);
    println!("  Research depth:     {}", stats.current_depth);
    println!("  Elapsed time:       {}", format_elapsed(stats.elapsed_secs));
    if let Some(report) = &outcome.artifacts.report {
        println!("  Report:             {}", report.display());
    }
    if let Some(graph) = &outcome.artifacts.graph {
        println!("  Knowledge graph:    {}", graph.display());
    }
}
