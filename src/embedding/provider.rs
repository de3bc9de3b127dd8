//! Embedding provider configuration and factory.
//!
//! Supports multiple embedding backends via a tagged enum configuration.
//! Default is a local candle model (BGE-small-en-v1.5).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::model::DEFAULT_MODEL_REPO;
use crate::embedding::{EmbeddingConfig, EmbeddingService, LocalEmbeddingService};
use crate::embedding::NoopEmbeddingService;
use crate::PulseError;

/// Embedding provider configuration.
///
/// Loaded from `{data_path}/embedding.toml` or `PULSE_EMBEDDING_PROVIDER` env var.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingProviderConfig {
    /// Local candle model (default).
    Local {
        /// Short name (e.g. "bge-small-en-v1.5") or HuggingFace repository id
        #[serde(default = "default_local_model")]
        model: String,
        /// Cache directory for model files
        #[serde(default)]
        cache_dir: Option<String>,
        /// Upper bound on texts per forward pass
        #[serde(default = "default_max_batch_size")]
        max_batch_size: usize,
    },
    /// No model; queries and backfill fail with a model error.
    Disabled,
}

fn default_local_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_max_batch_size() -> usize {
    64
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self::Local {
            model: default_local_model(),
            cache_dir: None,
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Stored metadata about the model that produced the corpus embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backfill_at: Option<String>,
}

impl EmbeddingMetadata {
    /// Describe the given service, stamped with the current time.
    pub fn for_service(service: &dyn EmbeddingService) -> Self {
        Self {
            embedding_model: service.model_name().to_string(),
            embedding_dimensions: service.dimensions(),
            embedding_provider: "local".to_string(),
            last_backfill_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Result of comparing the current model against stored corpus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelMatch {
    /// No metadata stored yet (fresh corpus or never backfilled).
    NoMetadata,
    /// Current model matches stored metadata.
    Match,
    /// Stored vectors came from a different model and cannot be compared with new queries.
    Mismatch {
        stored_model: String,
        stored_dimensions: usize,
        current_model: String,
        current_dimensions: usize,
    },
}

/// Compare stored metadata against the active service.
pub fn check_model_match(
    stored: Option<&EmbeddingMetadata>,
    service: &dyn EmbeddingService,
) -> ModelMatch {
    match stored {
        None => ModelMatch::NoMetadata,
        Some(meta)
            if meta.embedding_model == service.model_name()
                && meta.embedding_dimensions == service.dimensions() =>
        {
            ModelMatch::Match
        }
        Some(meta) => ModelMatch::Mismatch {
            stored_model: meta.embedding_model.clone(),
            stored_dimensions: meta.embedding_dimensions,
            current_model: service.model_name().to_string(),
            current_dimensions: service.dimensions(),
        },
    }
}

/// Map short model names to HuggingFace repository ids.
///
/// Anything containing a `/` is taken as a repository id or a local model
/// directory already.
pub fn resolve_model_repo(model: &str) -> Result<String, PulseError> {
    if model.contains('/') {
        return Ok(model.to_string());
    }
    let repo = match model {
        "bge-small-en-v1.5" => DEFAULT_MODEL_REPO,
        "bge-base-en-v1.5" => "BAAI/bge-base-en-v1.5",
        "bge-large-en-v1.5" => "BAAI/bge-large-en-v1.5",
        "all-minilm-l6-v2" => "sentence-transformers/all-MiniLM-L6-v2",
        other => {
            return Err(PulseError::Config(format!(
                "Unknown local embedding model: '{}'. Supported: bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, all-minilm-l6-v2, or a HuggingFace repo id",
                other
            )));
        }
    };
    Ok(repo.to_string())
}

/// Load embedding provider config with priority:
/// 1. `{data_path}/embedding.toml` file
/// 2. `PULSE_EMBEDDING_PROVIDER` env var (JSON)
/// 3. Default (local BGE-small-en-v1.5)
pub fn load_provider_config(data_path: &Path) -> EmbeddingProviderConfig {
    let config_path = data_path.join("embedding.toml");
    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<EmbeddingProviderConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded embedding config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {}. Using default.",
                    config_path.display(),
                    e
                );
            }
        }
    }

    if let Ok(json) = std::env::var("PULSE_EMBEDDING_PROVIDER") {
        match serde_json::from_str::<EmbeddingProviderConfig>(&json) {
            Ok(config) => {
                info!("Loaded embedding config from PULSE_EMBEDDING_PROVIDER env");
                return config;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse PULSE_EMBEDDING_PROVIDER: {}. Using default.",
                    e
                );
            }
        }
    }

    EmbeddingProviderConfig::default()
}

/// Create an embedding service from provider configuration.
pub fn create_embedding_service(
    config: &EmbeddingProviderConfig,
) -> Result<Arc<dyn EmbeddingService + Send + Sync>, PulseError> {
    match config {
        EmbeddingProviderConfig::Local {
            model,
            cache_dir,
            max_batch_size,
        } => {
            let embedding_config = EmbeddingConfig {
                model_repo: resolve_model_repo(model)?,
                cache_dir: cache_dir.as_ref().map(PathBuf::from),
                max_batch_size: *max_batch_size,
            };
            let service = LocalEmbeddingService::new(embedding_config)?;
            Ok(Arc::new(service))
        }
        EmbeddingProviderConfig::Disabled => {
            info!("Embedding provider disabled");
            Ok(Arc::new(NoopEmbeddingService::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_short_names() {
        assert_eq!(
            resolve_model_repo("bge-small-en-v1.5").unwrap(),
            "BAAI/bge-small-en-v1.5"
        );
        assert_eq!(
            resolve_model_repo("intfloat/e5-small-v2").unwrap(),
            "intfloat/e5-small-v2"
        );
        assert!(matches!(
            resolve_model_repo("text-embedding-005"),
            Err(PulseError::Config(_))
        ));
    }

    #[test]
    fn test_provider_config_from_toml() {
        let config: EmbeddingProviderConfig =
            toml::from_str("provider = \"local\"\nmodel = \"bge-base-en-v1.5\"\n").unwrap();
        assert_eq!(
            config,
            EmbeddingProviderConfig::Local {
                model: "bge-base-en-v1.5".into(),
                cache_dir: None,
                max_batch_size: 64,
            }
        );

        let disabled: EmbeddingProviderConfig = toml::from_str("provider = \"disabled\"").unwrap();
        assert_eq!(disabled, EmbeddingProviderConfig::Disabled);
    }

    #[test]
    fn test_model_match() {
        let service = NoopEmbeddingService::new();
        assert_eq!(check_model_match(None, &service), ModelMatch::NoMetadata);

        let same = EmbeddingMetadata {
            embedding_model: "noop".into(),
            embedding_dimensions: 384,
            embedding_provider: "local".into(),
            last_backfill_at: None,
        };
        assert_eq!(check_model_match(Some(&same), &service), ModelMatch::Match);

        let other = EmbeddingMetadata {
            embedding_model: "BAAI/bge-base-en-v1.5".into(),
            embedding_dimensions: 768,
            ..same
        };
        assert!(matches!(
            check_model_match(Some(&other), &service),
            ModelMatch::Mismatch {
                stored_dimensions: 768,
                ..
            }
        ));
    }
}
