use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::PulseDb;
use crate::embedding::provider::EmbeddingMetadata;
use crate::models::{FeedbackCreate, PendingRecord, ScoredText, UpsertStats};
use crate::repository::{CorpusCounts, RecordStore};
use crate::PulseError;

const TABLE: &str = "feedback";

/// Feedback row as stored, with the SurrealDB record id.
#[derive(Debug, Deserialize)]
struct FeedbackRow {
    text: String,
}

/// Content written on insert. `date` is omitted rather than sent as NULL,
/// which an `option<string>` field rejects.
#[derive(Debug, Serialize)]
struct FeedbackContent {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: RecordId,
}

/// SurrealDB implementation of RecordStore.
pub struct SurrealRecordStore {
    db: Arc<PulseDb>,
}

impl SurrealRecordStore {
    /// Create a new store over the given database connection.
    pub fn new(db: Arc<PulseDb>) -> Self {
        Self { db }
    }

    fn record_id(id: i64) -> RecordId {
        RecordId::from((TABLE, id))
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    async fn fetch_unembedded(&self) -> Result<Vec<PendingRecord>, PulseError> {
        let query = r#"SELECT record::id(id) AS id, text
                       FROM feedback
                       WHERE array::len(embedding) = 0
                       ORDER BY id ASC"#;
        let mut response = self.db.query(query).await?.check()?;
        let pending: Vec<PendingRecord> = response.take(0)?;
        Ok(pending)
    }

    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<(), PulseError> {
        if embedding.is_empty() {
            return Err(PulseError::Validation(format!(
                "Refusing to store an empty embedding for feedback {}",
                id
            )));
        }

        let mut response = self
            .db
            .query("UPDATE $record SET embedding = $embedding, embedded_at = time::now() RETURN id")
            .bind(("record", Self::record_id(id)))
            .bind(("embedding", embedding))
            .await?
            .check()?;
        let updated: Vec<IdOnly> = response.take(0)?;

        if updated.is_empty() {
            return Err(PulseError::store(format!("feedback {} not found", id)));
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredText>, PulseError> {
        // vector::similarity::cosine is 1 - cosine distance
        let query = format!(
            r#"SELECT text, vector::similarity::cosine(embedding, $query_vector) AS score
               FROM feedback
               WHERE array::len(embedding) > 0
               ORDER BY score DESC
               LIMIT {top_k}"#,
            top_k = top_k
        );

        let mut response = self
            .db
            .query(&query)
            .bind(("query_vector", query_vector.to_vec()))
            .await?
            .check()?;
        let results: Vec<ScoredText> = response.take(0)?;
        Ok(results)
    }

    async fn upsert_records(
        &self,
        records: Vec<FeedbackCreate>,
    ) -> Result<UpsertStats, PulseError> {
        let mut stats = UpsertStats::default();

        for record in records {
            let existing: Option<FeedbackRow> = self.db.select((TABLE, record.id)).await?;

            match existing {
                None => {
                    let created: Option<IdOnly> = self
                        .db
                        .create((TABLE, record.id))
                        .content(FeedbackContent {
                            text: record.text,
                            date: record.date,
                        })
                        .await?;
                    if created.is_none() {
                        return Err(PulseError::store(format!(
                            "Failed to create feedback {}",
                            record.id
                        )));
                    }
                    stats.inserted += 1;
                }
                Some(row) if row.text == record.text => {
                    stats.unchanged += 1;
                }
                Some(_) => {
                    self.db
                        .query(
                            "UPDATE $record SET text = $text, date = $date, \
                             embedding = [], embedded_at = NONE",
                        )
                        .bind(("record", Self::record_id(record.id)))
                        .bind(("text", record.text))
                        .bind(("date", record.date))
                        .await?
                        .check()?;
                    stats.updated += 1;
                }
            }
        }

        tracing::info!(
            "Upserted feedback: {} inserted, {} updated, {} unchanged",
            stats.inserted,
            stats.updated,
            stats.unchanged
        );

        Ok(stats)
    }

    async fn counts(&self) -> Result<CorpusCounts, PulseError> {
        let query = r#"SELECT count() AS total,
                              count(array::len(embedding) > 0) AS searchable
                       FROM feedback
                       GROUP ALL"#;
        let mut response = self.db.query(query).await?.check()?;

        #[derive(Deserialize)]
        struct CountRow {
            total: usize,
            searchable: usize,
        }

        let row: Option<CountRow> = response.take(0)?;
        Ok(row
            .map(|r| CorpusCounts {
                total: r.total,
                searchable: r.searchable,
            })
            .unwrap_or_default())
    }

    async fn reset_embeddings(&self) -> Result<usize, PulseError> {
        let mut response = self
            .db
            .query(
                "UPDATE feedback SET embedding = [], embedded_at = NONE \
                 WHERE array::len(embedding) > 0 RETURN id",
            )
            .query("DELETE pulse_meta:current")
            .await?
            .check()?;
        let cleared: Vec<IdOnly> = response.take(0)?;
        Ok(cleared.len())
    }

    async fn embedding_metadata(&self) -> Result<Option<EmbeddingMetadata>, PulseError> {
        let meta: Option<EmbeddingMetadata> = self.db.select(("pulse_meta", "current")).await?;
        Ok(meta)
    }

    async fn record_embedding_metadata(&self, meta: EmbeddingMetadata) -> Result<(), PulseError> {
        self.db
            .query("UPSERT pulse_meta:current CONTENT $meta")
            .bind(("meta", meta))
            .await?
            .check()?;
        Ok(())
    }
}
