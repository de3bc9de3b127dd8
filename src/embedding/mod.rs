//! Embedding infrastructure for semantic search.
//!
//! The [`EmbeddingService`] trait abstracts the model so pipelines can be
//! built against fakes in tests. [`LocalEmbeddingService`] runs a BERT-family
//! model locally through candle.

pub mod backfill;
pub mod candle_backend;
pub mod model;
pub mod provider;

use async_trait::async_trait;

use crate::PulseError;

pub use backfill::{BackfillConfig, BackfillReport, BackfillService, BatchOutcome};
pub use model::{EmbeddingConfig, LocalEmbeddingService};

/// No-op embedding service.
///
/// Always reports as unavailable and returns errors for embed operations.
/// Used when embedding is disabled and in tests that never reach the model.
pub struct NoopEmbeddingService;

impl Default for NoopEmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopEmbeddingService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PulseError> {
        Err(PulseError::Model(
            "Embedding service is not available (noop)".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn model_name(&self) -> &str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Service trait for generating text embeddings.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embeddings for multiple texts in one round trip.
    ///
    /// The output has the same length as `texts` and row `i` belongs to
    /// `texts[i]`; callers associate results by position.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PulseError>;

    /// Generate the embedding for a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, PulseError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PulseError::Model("No embedding returned".to_string()))
    }

    /// Embedding dimensions (e.g., 384 for BGE-small).
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model, stored alongside embeddings.
    fn model_name(&self) -> &str;

    /// Check if the embedding model is available.
    ///
    /// Returns false if the model failed to load (e.g., no network on first run).
    fn is_available(&self) -> bool;
}

/// Check that a model returned one vector per input.
pub(crate) fn ensure_aligned(inputs: usize, outputs: &[Vec<f32>]) -> Result<(), PulseError> {
    if outputs.len() != inputs {
        return Err(PulseError::Model(format!(
            "Model returned {} embeddings for {} texts",
            outputs.len(),
            inputs
        )));
    }
    if outputs.iter().any(|v| v.is_empty()) {
        return Err(PulseError::Model("Model returned an empty embedding".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_embed_one_fails_with_model_error() {
        let service = NoopEmbeddingService::new();
        assert!(!service.is_available());
        let err = service.embed_one("anything").await.unwrap_err();
        assert!(matches!(err, PulseError::Model(_)));
    }

    #[test]
    fn test_ensure_aligned() {
        assert!(ensure_aligned(2, &[vec![1.0], vec![2.0]]).is_ok());
        assert!(ensure_aligned(3, &[vec![1.0], vec![2.0]]).is_err());
        assert!(ensure_aligned(1, &[vec![]]).is_err());
    }
}
