//! Recall CLI
//!
//! Main entry point for the `recall` command-line tool: self-correcting
//! question answering over a local document index.

mod commands;
mod runtime;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, SessionCommand, StatsCommand};
use recall_core::{logging, AppConfig, ConfigOverrides};
use std::path::PathBuf;

/// Recall - grounded answers from your documents
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Self-correcting question answering over a local document index", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RECALL_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// LLM provider
    #[arg(short, long, global = true, env = "RECALL_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RECALL_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question, optionally continuing a session
    Ask(AskCommand),

    /// Inspect and manage sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Show index, prompt and backend status
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()
        .context("Failed to load configuration")?
        .with_overrides(ConfigOverrides {
            workspace: cli.workspace,
            config_file: cli.config,
            provider: cli.provider,
            model: cli.model,
            log_level: cli.log_level,
            verbose: cli.verbose,
            no_color: cli.no_color,
            log_json: cli.log_json,
        });
    config.validate().context("Invalid configuration")?;

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)
        .context("Failed to initialize logging")?;

    tracing::info!("Recall CLI starting");
    tracing::debug!(workspace = ?config.workspace, provider = %config.llm.provider, model = %config.llm.model);

    config
        .ensure_recall_dir()
        .context("Failed to prepare the .recall directory")?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Session(_) => "session",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(config).await,
        Commands::Session(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
