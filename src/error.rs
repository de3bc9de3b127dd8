use thiserror::Error;

/// Custom error type for Pulse operations.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Embedding computation failed (model unavailable, inference error, bad output).
    #[error("Model error: {0}")]
    Model(String),

    /// Read or write against the record store failed.
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),
}

impl PulseError {
    /// Store error without an underlying cause.
    pub fn store(message: impl Into<String>) -> Self {
        PulseError::Store {
            message: message.into(),
            source: None,
        }
    }
}

impl From<surrealdb::Error> for PulseError {
    fn from(err: surrealdb::Error) -> Self {
        PulseError::Store {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Failure of the query entry point.
///
/// `EmptyQuery` is a client-input error; everything the embedding model or the
/// record store reports is wrapped in `Upstream` with its cause preserved.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Query parameter is required")]
    EmptyQuery,

    #[error("Upstream failure: {0}")]
    Upstream(#[source] PulseError),
}

impl SearchError {
    /// Stable machine-readable kind for callers (CLI JSON, MCP, HTTP layers).
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::EmptyQuery => "missing_query",
            SearchError::Upstream(_) => "upstream_failure",
        }
    }

    /// Whether the caller, rather than an upstream service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::EmptyQuery)
    }
}

impl From<PulseError> for SearchError {
    fn from(err: PulseError) -> Self {
        SearchError::Upstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_search_error_codes() {
        assert_eq!(SearchError::EmptyQuery.code(), "missing_query");
        let upstream = SearchError::from(PulseError::Model("boom".into()));
        assert_eq!(upstream.code(), "upstream_failure");
        assert!(SearchError::EmptyQuery.is_client_error());
        assert!(!upstream.is_client_error());
    }

    #[test]
    fn test_upstream_preserves_cause() {
        let err = SearchError::from(PulseError::store("connection reset"));
        let source = err.source().expect("upstream error should expose its cause");
        assert!(source.to_string().contains("connection reset"));
    }
}
