//! Natural language query handler.

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::output::{output_json, print_error, print_hint, OutputMode};
use crate::init::AppContext;

pub async fn handle_ask(
    ctx: &AppContext,
    query: &str,
    limit: Option<usize>,
    mode: OutputMode,
) -> Result<ExitCode> {
    let result = match limit {
        Some(top_k) => ctx.search_service.answer_top_k(query, top_k).await,
        None => ctx.search_service.answer(query).await,
    };

    let answer = match result {
        Ok(answer) => answer,
        Err(err) => {
            tracing::warn!("Query failed: {}", err);
            match mode {
                OutputMode::Json => output_json(&serde_json::json!({
                    "error": err.code(),
                    "message": err.to_string(),
                })),
                OutputMode::Human => print_error(&err.to_string()),
            }
            return Ok(if err.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            });
        }
    };

    match mode {
        OutputMode::Json => output_json(&answer),
        OutputMode::Human => {
            if answer.matches == 0 {
                print_hint("No searchable feedback yet. Run 'pulse import' then 'pulse backfill'.");
            } else {
                println!("{}", answer.combined_feedback);
                print_hint(&format!("\n{} feedback forms", answer.matches));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
