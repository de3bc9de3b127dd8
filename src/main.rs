//! Pulse - semantic search over free-text survey feedback
//!
//! Usage:
//!   pulse import responses.yaml  Load survey responses
//!   pulse backfill               Embed records that have no embedding yet
//!   pulse ask "query"            Most similar feedback forms, formatted
//!   pulse status                 Corpus and model status
//!   pulse mcp                    Start MCP server on stdio
//!   pulse --help                 Show all commands

use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use pulse::cli::output::OutputMode;
use pulse::cli::{Cli, Commands};
use pulse::init::AppContext;
use pulse::mcp::server::run_mcp_server;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Tracing to stderr (safe for MCP stdio transport)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("pulse=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "pulse", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mcp => {
            let ctx = AppContext::new(cli.data_path.clone()).await?;
            run_mcp_server(ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
        cmd => {
            let ctx = AppContext::new(cli.data_path.clone()).await?;
            pulse::cli::execute(cmd, &ctx, mode).await
        }
    }
}
