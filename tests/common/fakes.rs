//! Deterministic stand-ins for the embedding model and a failing store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use pulse::embedding::provider::EmbeddingMetadata;
use pulse::embedding::EmbeddingService;
use pulse::models::{FeedbackCreate, PendingRecord, ScoredText, UpsertStats};
use pulse::repository::{CorpusCounts, RecordStore};
use pulse::utils::math::vector_normalize;
use pulse::PulseError;

pub const HASH_DIMENSIONS: usize = 16;

/// Bag-of-words embedder: each lowercase word bumps one of 16 buckets.
///
/// Any call containing a text with `FAIL_MODEL` fails with a model error.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; HASH_DIMENSIONS];
        // Constant component keeps every vector non-zero
        v[0] = 0.1;
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % HASH_DIMENSIONS] += 1.0;
        }
        vector_normalize(&v)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PulseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains("FAIL_MODEL")) {
            return Err(PulseError::Model("fake model rejected the batch".into()));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        HASH_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Embeds every text as the same fixed vector. Used to rank stored vectors
/// against a known query direction.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PulseError> {
        Ok(texts.iter().map(|_| self.0.clone()).collect())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Record store wrapper whose `update_embedding` fails for chosen ids.
pub struct FlakyStore {
    inner: Arc<dyn RecordStore>,
    failing_ids: HashSet<i64>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn RecordStore>, failing_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            inner,
            failing_ids: failing_ids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn fetch_unembedded(&self) -> Result<Vec<PendingRecord>, PulseError> {
        self.inner.fetch_unembedded().await
    }

    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<(), PulseError> {
        if self.failing_ids.contains(&id) {
            return Err(PulseError::store(format!("write to feedback {} timed out", id)));
        }
        self.inner.update_embedding(id, embedding).await
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredText>, PulseError> {
        self.inner.similarity_search(query_vector, top_k).await
    }

    async fn upsert_records(
        &self,
        records: Vec<FeedbackCreate>,
    ) -> Result<UpsertStats, PulseError> {
        self.inner.upsert_records(records).await
    }

    async fn reset_embeddings(&self) -> Result<usize, PulseError> {
        self.inner.reset_embeddings().await
    }

    async fn counts(&self) -> Result<CorpusCounts, PulseError> {
        self.inner.counts().await
    }

    async fn embedding_metadata(&self) -> Result<Option<EmbeddingMetadata>, PulseError> {
        self.inner.embedding_metadata().await
    }

    async fn record_embedding_metadata(&self, meta: EmbeddingMetadata) -> Result<(), PulseError> {
        self.inner.record_embedding_metadata(meta).await
    }
}
