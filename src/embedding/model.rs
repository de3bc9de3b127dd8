//! Local embedding model implementation using candle.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::embedding::candle_backend::{select_device, BertEmbedder, ModelFiles, Pooling};
use crate::embedding::{ensure_aligned, EmbeddingService};
use crate::PulseError;

/// Default HuggingFace repository for the embedding model.
pub const DEFAULT_MODEL_REPO: &str = "BAAI/bge-small-en-v1.5";

/// Configuration for embedding model initialization.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// HuggingFace repository id, or local directory, of a BERT-family
    /// sentence embedding model
    pub model_repo: String,
    /// Optional cache directory for model files
    pub cache_dir: Option<PathBuf>,
    /// Upper bound on texts per forward pass; larger calls are split
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_repo: DEFAULT_MODEL_REPO.to_string(),
            cache_dir: None,
            max_batch_size: 64,
        }
    }
}

/// Local embedding service using a candle BERT model.
///
/// The embedder is shared behind an `Arc` and every forward pass runs in
/// `spawn_blocking` since inference is synchronous and CPU-bound.
pub struct LocalEmbeddingService {
    embedder: Option<Arc<BertEmbedder>>,
    model_repo: String,
    max_batch_size: usize,
    dimensions: usize,
}

impl LocalEmbeddingService {
    /// Create a new local embedding service.
    ///
    /// Attempts to download and load the configured model. If that fails
    /// (e.g., no network on first run), the service is unavailable but
    /// construction still succeeds.
    pub fn new(config: EmbeddingConfig) -> Result<Self, PulseError> {
        if config.max_batch_size == 0 {
            return Err(PulseError::Validation(
                "Embedding max_batch_size must be at least 1".to_string(),
            ));
        }

        let pooling = Pooling::for_model(&config.model_repo);
        let loaded = ModelFiles::locate(&config.model_repo, config.cache_dir.as_deref())
            .and_then(|files| BertEmbedder::new(&files, select_device(), pooling));

        match loaded {
            Ok(embedder) => {
                let dimensions = embedder.hidden_size();
                info!(
                    "Embedding model loaded ({}, {} dimensions via candle)",
                    config.model_repo, dimensions
                );
                Ok(Self {
                    embedder: Some(Arc::new(embedder)),
                    model_repo: config.model_repo,
                    max_batch_size: config.max_batch_size,
                    dimensions,
                })
            }
            Err(e) => {
                warn!(
                    "Failed to load embedding model {}: {}. Embedding service will be unavailable.",
                    config.model_repo, e
                );
                Ok(Self {
                    embedder: None,
                    model_repo: config.model_repo,
                    max_batch_size: config.max_batch_size,
                    dimensions: 0,
                })
            }
        }
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PulseError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| PulseError::Model("Embedding model not loaded".to_string()))?
            .clone();

        if texts.is_empty() {
            return Ok(vec![]);
        }

        let inputs = texts.to_vec();
        let max_batch_size = self.max_batch_size;

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(inputs.len());
            // Chunks are processed in order, so output rows stay aligned with inputs
            for chunk in inputs.chunks(max_batch_size) {
                out.extend(embedder.embed(chunk)?);
            }
            Ok::<Vec<Vec<f32>>, anyhow::Error>(out)
        })
        .await
        .map_err(|e| PulseError::Model(format!("Task join error: {}", e)))?
        .map_err(|e| PulseError::Model(format!("Embedding error: {}", e)))?;

        ensure_aligned(texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_repo
    }

    fn is_available(&self) -> bool {
        self.embedder.is_some()
    }
}
