//! Record store: the queryable, updatable table of feedback records.
//!
//! The backfill and query pipelines only ever see the [`RecordStore`] trait.
//! [`SurrealRecordStore`] is the production implementation;
//! [`InMemoryRecordStore`] backs tests and dry runs.

pub mod memory;
pub mod surreal;

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::provider::EmbeddingMetadata;
use crate::models::{FeedbackCreate, PendingRecord, ScoredText, UpsertStats};
use crate::PulseError;

pub use memory::InMemoryRecordStore;
pub use surreal::SurrealRecordStore;

/// Record counts split by embedding state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusCounts {
    pub total: usize,
    pub searchable: usize,
}

impl CorpusCounts {
    /// Records still waiting for an embedding.
    pub fn embeddable(&self) -> usize {
        self.total.saturating_sub(self.searchable)
    }
}

/// Storage contract for feedback records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records whose embedding is empty, as `(id, text)` pairs.
    ///
    /// A single bulk read; records that already carry an embedding are never
    /// returned.
    async fn fetch_unembedded(&self) -> Result<Vec<PendingRecord>, PulseError>;

    /// Set the embedding of one record, keyed by id.
    ///
    /// Fails if the id does not exist or the vector is empty.
    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<(), PulseError>;

    /// Searchable records ranked by descending cosine similarity to
    /// `query_vector`, truncated to `top_k`.
    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredText>, PulseError>;

    /// Insert new records and refresh changed ones.
    ///
    /// A record whose text changed gets its embedding reset to empty so the
    /// next backfill picks it up again.
    async fn upsert_records(&self, records: Vec<FeedbackCreate>)
        -> Result<UpsertStats, PulseError>;

    /// Clear every stored embedding and the model metadata so the next
    /// backfill re-embeds the whole corpus. Returns the records cleared.
    async fn reset_embeddings(&self) -> Result<usize, PulseError>;

    /// Total and searchable record counts.
    async fn counts(&self) -> Result<CorpusCounts, PulseError>;

    /// Metadata about the model that produced the stored embeddings.
    async fn embedding_metadata(&self) -> Result<Option<EmbeddingMetadata>, PulseError> {
        Ok(None)
    }

    /// Persist embedding metadata after a backfill.
    async fn record_embedding_metadata(&self, _meta: EmbeddingMetadata) -> Result<(), PulseError> {
        Ok(())
    }
}
