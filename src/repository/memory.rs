use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::provider::EmbeddingMetadata;
use crate::models::{FeedbackCreate, FeedbackRecord, PendingRecord, ScoredText, UpsertStats};
use crate::repository::{CorpusCounts, RecordStore};
use crate::utils::math::cosine_similarity;
use crate::PulseError;

/// In-process record store.
///
/// Ranks with exact cosine similarity over every searchable record. Used by
/// tests and `--dry-run` style tooling where no database is wanted.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<i64, FeedbackRecord>>,
    metadata: RwLock<Option<EmbeddingMetadata>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records (embeddings kept as given).
    pub fn with_records(records: impl IntoIterator<Item = FeedbackRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            records: RwLock::new(map),
            metadata: RwLock::new(None),
        }
    }

    /// Current state of one record.
    pub async fn get(&self, id: i64) -> Option<FeedbackRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// All records ordered by id.
    pub async fn snapshot(&self) -> Vec<FeedbackRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_unembedded(&self) -> Result<Vec<PendingRecord>, PulseError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.is_embeddable())
            .map(|r| PendingRecord {
                id: r.id,
                text: r.text.clone(),
            })
            .collect())
    }

    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<(), PulseError> {
        if embedding.is_empty() {
            return Err(PulseError::Validation(format!(
                "Refusing to store an empty embedding for feedback {}",
                id
            )));
        }

        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| PulseError::store(format!("feedback {} not found", id)))?;
        record.embedding = embedding;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredText>, PulseError> {
        let records = self.records.read().await;

        let mut scored = Vec::new();
        for record in records.values().filter(|r| r.is_searchable()) {
            if record.embedding.len() != query_vector.len() {
                return Err(PulseError::store(format!(
                    "Dimension mismatch for feedback {}: stored {}, query {}",
                    record.id,
                    record.embedding.len(),
                    query_vector.len()
                )));
            }
            scored.push((
                record.id,
                ScoredText {
                    text: record.text.clone(),
                    score: cosine_similarity(&record.embedding, query_vector),
                },
            ));
        }

        // Score descending, then id ascending for a stable order
        scored.sort_by(|(id_a, a), (id_b, b)| match b.score.partial_cmp(&a.score) {
            Some(std::cmp::Ordering::Equal) | None => id_a.cmp(id_b),
            Some(ordering) => ordering,
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn upsert_records(
        &self,
        records: Vec<FeedbackCreate>,
    ) -> Result<UpsertStats, PulseError> {
        let mut stats = UpsertStats::default();
        let mut stored = self.records.write().await;

        for data in records {
            match stored.get_mut(&data.id) {
                None => {
                    stored.insert(data.id, FeedbackRecord::from(data));
                    stats.inserted += 1;
                }
                Some(existing) if existing.text == data.text => {
                    stats.unchanged += 1;
                }
                Some(existing) => {
                    existing.text = data.text;
                    existing.date = data.date;
                    existing.embedding.clear();
                    stats.updated += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn counts(&self) -> Result<CorpusCounts, PulseError> {
        let records = self.records.read().await;
        Ok(CorpusCounts {
            total: records.len(),
            searchable: records.values().filter(|r| r.is_searchable()).count(),
        })
    }

    async fn reset_embeddings(&self) -> Result<usize, PulseError> {
        let mut cleared = 0;
        for record in self.records.write().await.values_mut() {
            if record.is_searchable() {
                record.embedding.clear();
                cleared += 1;
            }
        }
        *self.metadata.write().await = None;
        Ok(cleared)
    }

    async fn embedding_metadata(&self) -> Result<Option<EmbeddingMetadata>, PulseError> {
        Ok(self.metadata.read().await.clone())
    }

    async fn record_embedding_metadata(&self, meta: EmbeddingMetadata) -> Result<(), PulseError> {
        *self.metadata.write().await = Some(meta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, embedding: Vec<f32>) -> FeedbackRecord {
        FeedbackRecord {
            id,
            text: format!("Question: Q{id} Answer: A{id}"),
            date: None,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_fetch_unembedded_excludes_searchable() {
        let store = InMemoryRecordStore::with_records(vec![
            record(1, vec![]),
            record(2, vec![1.0, 0.0]),
            record(3, vec![]),
        ]);

        let pending = store.fetch_unembedded().await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_update_missing_id_fails() {
        let store = InMemoryRecordStore::new();
        let err = store.update_embedding(42, vec![1.0]).await.unwrap_err();
        assert!(matches!(err, PulseError::Store { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_vector() {
        let store = InMemoryRecordStore::with_records(vec![record(1, vec![])]);
        let err = store.update_embedding(1, vec![]).await.unwrap_err();
        assert!(matches!(err, PulseError::Validation(_)));
        assert!(store.get(1).await.unwrap().is_embeddable());
    }

    #[tokio::test]
    async fn test_similarity_ranks_descending() {
        let store = InMemoryRecordStore::with_records(vec![
            record(1, vec![0.0, 1.0]),
            record(2, vec![1.0, 0.0]),
            record(3, vec![1.0, 1.0]),
            record(4, vec![]),
        ]);

        let hits = store.similarity_search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 3, "unembedded record must not be ranked");
        assert!(hits[0].text.contains("Q2"));
        assert!(hits[1].text.contains("Q3"));
        assert!(hits[2].text.contains("Q1"));
    }

    #[tokio::test]
    async fn test_upsert_resets_changed_embedding() {
        let store = InMemoryRecordStore::with_records(vec![record(1, vec![1.0])]);

        let stats = store
            .upsert_records(vec![
                FeedbackCreate {
                    id: 1,
                    text: "Question: new Answer: text".into(),
                    date: None,
                },
                FeedbackCreate {
                    id: 2,
                    text: "Question: Q2 Answer: A2".into(),
                    date: Some("2024-05-01".into()),
                },
            ])
            .await
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);
        assert!(store.get(1).await.unwrap().is_embeddable());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.embeddable(), 2);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime")
                .block_on(fut)
        }

        fn arb_corpus() -> impl Strategy<Value = Vec<FeedbackRecord>> {
            proptest::collection::vec(
                proptest::option::of((-1.0f32..1.0, -1.0f32..1.0)),
                0..40,
            )
            .prop_map(|vectors| {
                vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let embedding = v.map(|(x, y)| vec![x, y + 2.0]).unwrap_or_default();
                        record(i as i64, embedding)
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_embeddable_and_searchable_partition_the_corpus(corpus in arb_corpus()) {
                let total = corpus.len();
                let searchable: Vec<i64> = corpus
                    .iter()
                    .filter(|r| r.is_searchable())
                    .map(|r| r.id)
                    .collect();
                let store = InMemoryRecordStore::with_records(corpus);

                let (pending, counts) = block_on(async {
                    (
                        store.fetch_unembedded().await.unwrap(),
                        store.counts().await.unwrap(),
                    )
                });

                prop_assert_eq!(counts.total, total);
                prop_assert_eq!(counts.searchable, searchable.len());
                prop_assert_eq!(pending.len(), counts.embeddable());
                prop_assert!(pending.iter().all(|p| !searchable.contains(&p.id)));
            }

            #[test]
            fn prop_search_is_sorted_and_bounded(corpus in arb_corpus(), top_k in 0usize..50) {
                let searchable = corpus.iter().filter(|r| r.is_searchable()).count();
                let store = InMemoryRecordStore::with_records(corpus);

                let hits = block_on(store.similarity_search(&[1.0, 0.5], top_k)).unwrap();

                prop_assert_eq!(hits.len(), top_k.min(searchable));
                for pair in hits.windows(2) {
                    prop_assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }
}
