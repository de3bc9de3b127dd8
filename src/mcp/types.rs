use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::embedding::provider::ModelMatch;
use crate::embedding::BackfillReport;
use crate::services::{CorpusStatus, FeedbackAnswer};

/// Maximum allowed limit for result counts (prevents unbounded queries).
pub const MAX_LIMIT: usize = 500;

/// Input for search_feedback tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchFeedbackInput {
    /// Natural language question about the feedback (e.g., "what did people say about the pace?")
    pub query: String,
    /// Maximum feedback forms to include (default: configured top_k, usually 100)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchFeedbackResponse {
    /// Matching feedback forms, most similar first
    pub combined_feedback: String,
    /// Number of feedback forms included
    pub matches: usize,
}

impl From<FeedbackAnswer> for SearchFeedbackResponse {
    fn from(answer: FeedbackAnswer) -> Self {
        Self {
            combined_feedback: answer.combined_feedback,
            matches: answer.matches,
        }
    }
}

/// Input for backfill_embeddings tool. Omitted fields use the configured values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BackfillInput {
    /// Records per model call
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Batches embedded concurrently
    #[serde(default)]
    pub max_parallel_batches: Option<usize>,
    /// Abort unfinished batches after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailedRecordInfo {
    pub id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackfillResponse {
    pub selected: usize,
    pub batches: usize,
    pub updated: usize,
    pub failed: usize,
    pub cancelled_batches: usize,
    pub cancelled_records: usize,
    pub duration_ms: i64,
    /// Records left without an embedding, with the reason
    pub failures: Vec<FailedRecordInfo>,
}

impl From<BackfillReport> for BackfillResponse {
    fn from(report: BackfillReport) -> Self {
        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();
        Self {
            selected: report.selected,
            batches: report.batch_sizes.len(),
            updated: report.updated,
            failed: report.failed,
            cancelled_batches: report.cancelled_batches.len(),
            cancelled_records: report.cancelled_records,
            duration_ms,
            failures: report
                .batches
                .into_iter()
                .flat_map(|b| b.failed)
                .map(|f| FailedRecordInfo {
                    id: f.id,
                    reason: f.reason,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CorpusStatusResponse {
    pub total: usize,
    pub searchable: usize,
    pub embeddable: usize,
    /// Model that produced the stored embeddings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backfill_at: Option<String>,
    /// no_metadata, match, or mismatch
    pub model_match: String,
}

impl From<CorpusStatus> for CorpusStatusResponse {
    fn from(status: CorpusStatus) -> Self {
        let model_match = match status.model_match {
            ModelMatch::NoMetadata => "no_metadata",
            ModelMatch::Match => "match",
            ModelMatch::Mismatch { .. } => "mismatch",
        };
        Self {
            total: status.total,
            searchable: status.searchable,
            embeddable: status.embeddable,
            embedding_model: status.model.as_ref().map(|m| m.embedding_model.clone()),
            embedding_dimensions: status.model.as_ref().map(|m| m.embedding_dimensions),
            last_backfill_at: status.model.and_then(|m| m.last_backfill_at),
            model_match: model_match.to_string(),
        }
    }
}
