use crate::{PulseError, SearchError};
use rmcp::model::{Content, IntoContents};
use serde::Serialize;

/// Structured error response for MCP tool calls.
/// Provides error_code + suggestion so LLMs can auto-fix.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub error_code: String,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoContents for ToolError {
    fn into_contents(self) -> Vec<Content> {
        let json = serde_json::to_string(&self).unwrap_or_else(|_| self.message.clone());
        vec![Content::text(json)]
    }
}

impl From<SearchError> for ToolError {
    fn from(err: SearchError) -> Self {
        let (suggestion, field) = match &err {
            SearchError::EmptyQuery => (
                "Pass a non-empty natural language question in `query`.",
                Some("query".to_string()),
            ),
            SearchError::Upstream(PulseError::Model(_)) => (
                "The embedding model is unavailable. Check the embedding provider config and network access for the first model download.",
                None,
            ),
            SearchError::Upstream(_) => ("Retry the query; the record store failed.", None),
        };
        ToolError {
            error_code: err.code().to_string(),
            message: err.to_string(),
            suggestion: suggestion.to_string(),
            field,
        }
    }
}

impl From<PulseError> for ToolError {
    fn from(err: PulseError) -> Self {
        let (error_code, suggestion) = match &err {
            PulseError::Validation(_) => (
                "VALIDATION_ERROR",
                "batch_size and max_parallel_batches must be at least 1.",
            ),
            PulseError::Config(_) => ("CONFIG_ERROR", "Fix the configuration file and restart."),
            PulseError::Model(_) => (
                "MODEL_UNAVAILABLE",
                "The embedding model failed to load. Check the embedding provider config.",
            ),
            PulseError::Store { .. } => (
                "STORE_ERROR",
                "Retry the operation; the record store failed.",
            ),
        };
        ToolError {
            error_code: error_code.into(),
            message: err.to_string(),
            suggestion: suggestion.into(),
            field: None,
        }
    }
}
