//! Shared initialization logic for MCP and CLI modes.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_pulse_config, PulseConfig};
use crate::db::connection::{init_db, load_db_config, PulseDb};
use crate::db::schema::apply_schema;
use crate::embedding::provider::{
    check_model_match, create_embedding_service, load_provider_config, ModelMatch,
};
use crate::embedding::{BackfillConfig, BackfillService, EmbeddingService};
use crate::repository::{RecordStore, SurrealRecordStore};
use crate::services::{FeedbackSearchService, IngestService, SearchService};

/// Application context holding all services.
///
/// Built once at startup and shared between MCP server and CLI commands.
pub struct AppContext {
    pub db: Arc<PulseDb>,
    pub data_path: PathBuf,
    pub config: PulseConfig,
    pub store: Arc<dyn RecordStore>,
    pub embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    pub search_service: Arc<dyn SearchService>,
    pub ingest_service: Arc<IngestService>,
}

/// Resolve the data directory.
///
/// Priority: explicit path > PULSE_DATA_PATH env > ./.pulse (if exists) > ~/.pulse
pub fn resolve_data_path(explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| std::env::var("PULSE_DATA_PATH").ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".pulse");
            if local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".pulse"))
                .unwrap_or_else(|| PathBuf::from(".pulse"))
        })
}

impl AppContext {
    /// Initialize application context.
    pub async fn new(explicit_path: Option<PathBuf>) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        std::fs::create_dir_all(&data_path)?;
        tracing::info!("Using data path: {}", data_path.display());

        let config = load_pulse_config(&data_path);
        config.validate()?;

        let db_config = load_db_config(&data_path);
        let db = init_db(&db_config, &data_path).await?;
        tracing::info!("Database connected");

        apply_schema(&db).await?;
        tracing::info!("Schema applied");

        let db = Arc::new(db);

        tracing::info!("Initializing embedding model...");
        let provider_config = load_provider_config(&data_path);
        let embedding_service = create_embedding_service(&provider_config)?;

        if embedding_service.is_available() {
            tracing::info!(
                "Embedding model loaded ({}, {} dimensions)",
                embedding_service.model_name(),
                embedding_service.dimensions()
            );
        } else {
            tracing::warn!("Embedding model not available; queries and backfill will fail");
        }

        let store: Arc<dyn RecordStore> = Arc::new(SurrealRecordStore::new(db.clone()));

        Self::from_parts(db, data_path, config, store, embedding_service).await
    }

    /// Wire services around an existing store and embedding service.
    pub async fn from_parts(
        db: Arc<PulseDb>,
        data_path: PathBuf,
        config: PulseConfig,
        store: Arc<dyn RecordStore>,
        embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    ) -> Result<Self> {
        if embedding_service.is_available() {
            warn_on_model_mismatch(store.as_ref(), embedding_service.as_ref()).await;
        }

        let search_service: Arc<dyn SearchService> = Arc::new(
            FeedbackSearchService::new(store.clone(), embedding_service.clone())
                .with_default_top_k(config.search.top_k),
        );
        let ingest_service = Arc::new(IngestService::new(
            store.clone(),
            config.ingest.excluded_questions.clone(),
        ));

        Ok(Self {
            db,
            data_path,
            config,
            store,
            embedding_service,
            search_service,
            ingest_service,
        })
    }

    /// Backfill service over the shared store and model with the given tuning.
    pub fn backfill_service(&self, config: BackfillConfig) -> BackfillService {
        BackfillService::new(
            self.store.clone(),
            self.embedding_service.clone(),
            config,
        )
    }
}

/// Log a warning when stored embeddings came from a different model.
async fn warn_on_model_mismatch(store: &dyn RecordStore, service: &dyn EmbeddingService) {
    let stored = match store.embedding_metadata().await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!("Failed to read embedding metadata: {}", e);
            return;
        }
    };

    if let ModelMatch::Mismatch {
        stored_model,
        stored_dimensions,
        current_model,
        current_dimensions,
    } = check_model_match(stored.as_ref(), service)
    {
        tracing::warn!(
            "Embedding model changed: corpus was embedded with {} ({}d), current model is {} ({}d). Run 'pulse backfill --reset' to re-embed the corpus.",
            stored_model,
            stored_dimensions,
            current_model,
            current_dimensions
        );
    }
}
