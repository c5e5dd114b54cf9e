//! deepscout CLI — drives a research run from the terminal.
//!
//! Collects the run configuration interactively (or from arguments), wires
//! the Gemini collaborator to the workflow controller, and prints the run
//! summary when the workflow completes.

mod engine;
mod prompts;

use clap::Parser;
use deepscout_core::export::OutputPaths;
use deepscout_core::state::StateStore;
use deepscout_core::workflow::WorkflowController;
use deepscout_core::{ScoutError, persistence};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// deepscout: a terminal deep-research laboratory
#[derive(Parser, Debug)]
#[command(name = "deepscout", version, about, long_about = None)]
struct Cli {
    /// Research query (prompted interactively if omitted)
    query: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remove a stale progress snapshot from a previous run before starting
    #[arg(long)]
    clean: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "deepscout", "deepscout")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "deepscout.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return handle_command(command, &workspace);
    }

    let config = deepscout_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    // The `--clean` flag clears a leftover snapshot so the dashboard never
    // starts on a previous run's tree.
    if cli.clean && persistence::remove_stale(&config.research.snapshot_path)? {
        println!(
            "  Removed stale snapshot: {}",
            config.research.snapshot_path.display()
        );
    }

    if !cli.quiet {
        prompts::print_banner();
    }

    let request = prompts::collect_run_request(cli.query, &config)?;

    let collaborator = engine::GeminiCollaborator::from_settings(&config.research, request.mode)?;
    let paths = OutputPaths::new(&config.output.base_dir);
    let store = StateStore::with_checkpoint(paths.trees().join("latest.json"));
    let callback = Arc::new(prompts::TerminalCallback::new(cli.quiet));
    let dashboard = Arc::new(prompts::TerminalDashboard::new(cli.quiet));

    let controller = WorkflowController::new(
        collaborator,
        store,
        paths,
        config.research.snapshot_path.clone(),
        callback,
    )
    .with_poll_interval(Duration::from_secs(config.research.poll_interval_secs.max(1)))
    .with_observer(dashboard)
    .with_credential_var(config.research.api_key_env.clone());

    match controller.run(request).await {
        Ok(outcome) => {
            if !cli.quiet {
                prompts::print_run_summary(&outcome);
            }
            Ok(())
        }
        Err(ScoutError::Engine(err)) => {
            eprintln!("  Fatal: {err}");
            eprintln!("  Set the API key and try again (see `deepscout config show`).");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("  Fatal: {err}");
            std::process::exit(1);
        }
    }
}

fn handle_command(command: Commands, workspace: &std::path::Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let path = deepscout_core::config::write_default_config(workspace)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                println!("  Wrote default configuration to {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                let config = deepscout_core::load_config(Some(workspace), None)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}
