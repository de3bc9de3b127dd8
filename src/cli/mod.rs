//! CLI interface for Pulse.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use output::OutputMode;

/// Pulse - semantic search over free-text survey feedback
#[derive(Parser)]
#[command(name = "pulse", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ./.pulse if present, else ~/.pulse)
    #[arg(long, env = "PULSE_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

fn parse_limit(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start MCP server (stdio transport)
    Mcp,

    /// Ask a question; prints the most similar feedback forms
    #[command(alias = "search")]
    Ask {
        /// The question to ask
        query: String,
        /// Maximum feedback forms (default: search.top_k from pulse.toml)
        #[arg(long, value_parser = parse_limit)]
        limit: Option<usize>,
    },

    /// Embed every feedback record that has no embedding yet
    Backfill {
        /// Records per model call (default: backfill.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Batches embedded concurrently (default: backfill.max_parallel_batches)
        #[arg(long)]
        parallel: Option<usize>,
        /// Abort unfinished batches after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Clear all stored embeddings first (after changing the model)
        #[arg(long)]
        reset: bool,
    },

    /// Import survey responses from a YAML or JSON file
    Import {
        /// File with a top-level `responses` list
        file: PathBuf,
        /// Parse and flatten without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Corpus status: record counts and embedding model
    Status,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: clap_complete::Shell,
    },
}

/// Execute a CLI command, dispatching to the appropriate handler.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Mcp => anyhow::bail!("MCP is handled in main"),
        Commands::Completions { .. } => anyhow::bail!("Completions are handled in main"),

        Commands::Ask { query, limit } => handlers::ask::handle_ask(ctx, query, *limit, mode).await,

        Commands::Backfill {
            batch_size,
            parallel,
            deadline_secs,
            reset,
        } => {
            let options = handlers::backfill::BackfillOptions {
                batch_size: *batch_size,
                parallel: *parallel,
                deadline_secs: *deadline_secs,
                reset: *reset,
            };
            handlers::backfill::handle_backfill(ctx, options, mode).await
        }

        Commands::Import { file, dry_run } => {
            handlers::import::handle_import(ctx, file, *dry_run, mode).await
        }

        Commands::Status => handlers::status::handle_status(ctx, mode).await,
    }
}
