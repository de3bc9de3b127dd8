use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use crate::cli::output::{output_json, print_hint, print_success, print_table, OutputMode};
use crate::init::AppContext;
use crate::services::{flatten, load_import_file};

pub async fn handle_import(
    ctx: &AppContext,
    file: &Path,
    dry_run: bool,
    mode: OutputMode,
) -> Result<ExitCode> {
    let document = load_import_file(file)?;

    if dry_run {
        let excluded = &ctx.config.ingest.excluded_questions;
        let rows: Vec<Vec<String>> = document
            .responses
            .iter()
            .map(|r| {
                let text = flatten(r, excluded);
                vec![
                    r.id.to_string(),
                    r.date.clone().unwrap_or_default(),
                    text.chars().take(80).collect(),
                ]
            })
            .collect();

        match mode {
            OutputMode::Json => output_json(&serde_json::json!({
                "dry_run": true,
                "responses": document.responses.len(),
                "excluded_questions": excluded,
            })),
            OutputMode::Human => {
                println!("Dry run: no changes will be made\n");
                print_table(&["Id", "Date", "Text"], rows);
                println!("\nTotal: {} responses", document.responses.len());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary = ctx.ingest_service.import(document).await?;

    match mode {
        OutputMode::Json => output_json(&summary),
        OutputMode::Human => {
            print_success(&format!(
                "Import complete: {} inserted, {} updated, {} unchanged, {} skipped",
                summary.stats.inserted,
                summary.stats.updated,
                summary.stats.unchanged,
                summary.skipped.len()
            ));
            if summary.stats.inserted + summary.stats.updated > 0 {
                print_hint("\nRun 'pulse backfill' to make the new feedback searchable.");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
