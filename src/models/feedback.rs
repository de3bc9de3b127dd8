//! Feedback records and the shapes that flow through the embedding lifecycle.
//!
//! A record is *embeddable* while its embedding is empty and *searchable* once
//! it is not. Those two states partition the corpus and are the only gate for
//! inclusion in similarity search.

use serde::{Deserialize, Serialize};

/// A stored feedback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Externally supplied, unique and immutable.
    pub id: i64,
    /// Flattened `Question: q Answer: a` units joined by `"; "`.
    pub text: String,
    /// Submission date as carried by the export, if any.
    #[serde(default)]
    pub date: Option<String>,
    /// Empty until the backfill computes it.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl FeedbackRecord {
    pub fn is_searchable(&self) -> bool {
        !self.embedding.is_empty()
    }

    pub fn is_embeddable(&self) -> bool {
        self.embedding.is_empty()
    }
}

/// Data for ingesting a record. Embedding always starts empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCreate {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl From<FeedbackCreate> for FeedbackRecord {
    fn from(data: FeedbackCreate) -> Self {
        Self {
            id: data.id,
            text: data.text,
            date: data.date,
            embedding: Vec::new(),
        }
    }
}

/// A record selected for embedding: the `(id, text)` pair the backfill needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: i64,
    pub text: String,
}

/// One similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredText {
    pub text: String,
    /// `1 - cosine_distance`; may exceed 1.0 slightly from float rounding.
    pub score: f32,
}

/// Outcome counts for an ingestion upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    /// Ids that did not exist before.
    pub inserted: usize,
    /// Existing ids whose text changed; their embedding was reset.
    pub updated: usize,
    /// Existing ids with identical text; left untouched.
    pub unchanged: usize,
}
