//! Progress reporting for long-running operations.
//!
//! The backfill reports every finished batch through [`ProgressReporter`].
//! MCP tools forward those updates as progress notifications, the CLI renders
//! them as a progress bar, and tests use [`NoopProgressReporter`].

use std::sync::Arc;

use async_trait::async_trait;

/// Receives progress updates. `current` runs from 0.0 to `total`.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Report progress. Never fails the caller.
    async fn report(&self, current: f64, total: f64, message: Option<String>);

    /// Report `done` out of `total` units of work.
    async fn units(&self, done: usize, total: usize, message: &str) {
        self.report(done as f64, total as f64, Some(message.to_string()))
            .await;
    }
}

/// Reporter that drops every update.
pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report(&self, _current: f64, _total: f64, _message: Option<String>) {}
}

pub fn noop_progress() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopProgressReporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every update it receives.
    #[derive(Default)]
    struct RecordingReporter {
        updates: Mutex<Vec<(f64, f64, Option<String>)>>,
    }

    #[async_trait]
    impl ProgressReporter for RecordingReporter {
        async fn report(&self, current: f64, total: f64, message: Option<String>) {
            self.updates.lock().await.push((current, total, message));
        }
    }

    #[tokio::test]
    async fn test_units_reports_raw_counts() {
        let reporter = RecordingReporter::default();
        reporter.units(2, 3, "Embedded batch 2/3").await;

        let updates = reporter.updates.lock().await;
        assert_eq!(
            *updates,
            vec![(2.0, 3.0, Some("Embedded batch 2/3".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_noop_progress_accepts_updates() {
        let reporter = noop_progress();
        reporter.report(0.0, 1.0, None).await;
        reporter.units(1, 1, "done").await;
    }
}
