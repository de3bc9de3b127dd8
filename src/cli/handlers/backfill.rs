use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cli::output::{
    output_json, print_header, print_kv, print_success, print_table, print_warning, BarProgress,
    OutputMode,
};
use crate::embedding::BackfillConfig;
use crate::init::AppContext;

/// Command-line overrides for a backfill run.
#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    pub batch_size: Option<usize>,
    pub parallel: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub reset: bool,
}

impl BackfillOptions {
    fn apply(&self, mut config: BackfillConfig) -> BackfillConfig {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(parallel) = self.parallel {
            config.max_parallel_batches = parallel;
        }
        if let Some(secs) = self.deadline_secs {
            config.deadline = Some(Duration::from_secs(secs));
        }
        config
    }
}

pub async fn handle_backfill(
    ctx: &AppContext,
    options: BackfillOptions,
    mode: OutputMode,
) -> Result<ExitCode> {
    let config = options.apply(ctx.config.backfill.to_backfill_config());
    config.validate()?;

    let service = ctx.backfill_service(config);
    if options.reset {
        let cleared = service.reset_embeddings().await?;
        if mode == OutputMode::Human {
            println!("Cleared {} stored embeddings.", cleared);
        }
    }

    let report = if mode == OutputMode::Human {
        let bar = Arc::new(BarProgress::new("Embedding feedback"));
        let report = service.with_progress(bar.clone()).run().await;
        bar.finish();
        report?
    } else {
        service.run().await?
    };

    if mode == OutputMode::Json {
        output_json(&report);
    } else {
        print_header("Backfill");
        print_kv("Selected", &report.selected.to_string());
        print_kv("Batches", &report.batch_sizes.len().to_string());
        print_kv("Updated", &report.updated.to_string());
        print_kv("Failed", &report.failed.to_string());
        if !report.cancelled_batches.is_empty() {
            print_kv(
                "Cancelled",
                &format!(
                    "{} batches ({} records)",
                    report.cancelled_batches.len(),
                    report.cancelled_records
                ),
            );
        }

        if report.failed > 0 {
            let rows: Vec<Vec<String>> = report
                .batches
                .iter()
                .flat_map(|b| {
                    b.failed
                        .iter()
                        .map(move |f| vec![b.index.to_string(), f.id.to_string(), f.reason.clone()])
                })
                .collect();
            println!();
            print_table(&["Batch", "Record", "Reason"], rows);
        }

        if report.is_complete() {
            print_success(&format!("{} records embedded", report.updated));
        } else {
            print_warning("Some records are still without an embedding; re-run 'pulse backfill'.");
        }
    }

    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
