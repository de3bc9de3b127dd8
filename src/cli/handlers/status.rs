use std::process::ExitCode;

use anyhow::Result;

use crate::cli::output::{output_json, print_header, print_hint, print_kv, print_warning, OutputMode};
use crate::embedding::provider::ModelMatch;
use crate::init::AppContext;

pub async fn handle_status(ctx: &AppContext, mode: OutputMode) -> Result<ExitCode> {
    let status = ctx.search_service.status().await?;

    if mode == OutputMode::Json {
        output_json(&status);
        return Ok(ExitCode::SUCCESS);
    }

    print_header("Feedback corpus");
    print_kv("Records", &status.total.to_string());
    print_kv("Searchable", &status.searchable.to_string());
    print_kv("Awaiting embedding", &status.embeddable.to_string());

    print_header("Embedding model");
    print_kv(
        "Active",
        &format!(
            "{} ({})",
            ctx.embedding_service.model_name(),
            if ctx.embedding_service.is_available() {
                "loaded"
            } else {
                "unavailable"
            }
        ),
    );
    if let Some(meta) = &status.model {
        print_kv(
            "Corpus",
            &format!("{} ({}d)", meta.embedding_model, meta.embedding_dimensions),
        );
        if let Some(at) = &meta.last_backfill_at {
            print_kv("Last backfill", at);
        }
    }

    if let ModelMatch::Mismatch { .. } = status.model_match {
        print_warning("Corpus was embedded with a different model. Run 'pulse backfill --reset'.");
    } else if status.embeddable > 0 {
        print_hint(&format!(
            "\n{} records are not searchable yet. Run 'pulse backfill'.",
            status.embeddable
        ));
    }

    Ok(ExitCode::SUCCESS)
}
