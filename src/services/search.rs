use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::provider::{check_model_match, EmbeddingMetadata, ModelMatch};
use crate::embedding::EmbeddingService;
use crate::models::ScoredText;
use crate::repository::RecordStore;
use crate::services::format::format_feedback;
use crate::{PulseError, SearchError};

/// Default number of records retrieved for an answer.
pub const DEFAULT_TOP_K: usize = 100;

/// Formatted answer to a feedback query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackAnswer {
    pub combined_feedback: String,
    /// Records that went into `combined_feedback`.
    pub matches: usize,
}

/// Embedding coverage of the corpus.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStatus {
    pub total: usize,
    pub searchable: usize,
    pub embeddable: usize,
    pub model: Option<EmbeddingMetadata>,
    pub model_match: ModelMatch,
}

/// Query pipeline over the feedback corpus.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Records most similar to `query`, best first, at most `top_k`.
    ///
    /// Empty or whitespace-only queries fail with [`SearchError::EmptyQuery`]
    /// before the model or store is called.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredText>, SearchError>;

    /// Search with the configured default `top_k` and format the hits.
    async fn answer(&self, query: &str) -> Result<FeedbackAnswer, SearchError>;

    /// Search with an explicit `top_k` and format the hits.
    async fn answer_top_k(&self, query: &str, top_k: usize)
        -> Result<FeedbackAnswer, SearchError>;

    /// Record counts and model metadata.
    async fn status(&self) -> Result<CorpusStatus, PulseError>;
}

/// Search service backed by a [`RecordStore`] and an [`EmbeddingService`].
pub struct FeedbackSearchService {
    store: Arc<dyn RecordStore>,
    embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    default_top_k: usize,
}

impl FeedbackSearchService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    ) -> Self {
        Self {
            store,
            embedding_service,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }
}

#[async_trait]
impl SearchService for FeedbackSearchService {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredText>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if top_k == 0 {
            return Ok(vec![]);
        }

        let query_vector = self.embedding_service.embed_one(query).await?;
        let hits = self.store.similarity_search(&query_vector, top_k).await?;

        debug!("Query matched {} records (top_k {})", hits.len(), top_k);
        Ok(hits)
    }

    async fn answer(&self, query: &str) -> Result<FeedbackAnswer, SearchError> {
        self.answer_top_k(query, self.default_top_k).await
    }

    async fn answer_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<FeedbackAnswer, SearchError> {
        let hits = self.search(query, top_k).await?;
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();

        Ok(FeedbackAnswer {
            combined_feedback: format_feedback(&texts),
            matches: hits.len(),
        })
    }

    async fn status(&self) -> Result<CorpusStatus, PulseError> {
        let counts = self.store.counts().await?;
        let model = self.store.embedding_metadata().await?;
        let model_match = check_model_match(model.as_ref(), self.embedding_service.as_ref());

        Ok(CorpusStatus {
            total: counts.total,
            searchable: counts.searchable,
            embeddable: counts.embeddable(),
            model,
            model_match,
        })
    }
}
