//! Ingestion of survey responses into flattened feedback records.
//!
//! Responses arrive with named question/answer pairs. Each one is flattened
//! into the `Question: q Answer: a` blob the formatter understands and upserted
//! with an empty embedding, ready for the next backfill.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{FeedbackCreate, UpsertStats};
use crate::repository::RecordStore;
use crate::PulseError;

/// One answered question of a survey response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// A survey response as exported, keyed by field name rather than position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
}

/// Top-level import file shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub responses: Vec<SurveyResponse>,
}

/// Result of an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    #[serde(flatten)]
    pub stats: UpsertStats,
    /// Responses with nothing left after exclusions.
    pub skipped: Vec<i64>,
}

/// Flatten a response into `Question: q Answer: a` units joined by `"; "`.
///
/// Questions named in `excluded` are left out.
pub fn flatten(response: &SurveyResponse, excluded: &BTreeSet<String>) -> String {
    response
        .answers
        .iter()
        .filter(|qa| !excluded.contains(qa.question.trim()))
        .map(|qa| format!("Question: {} Answer: {}", qa.question.trim(), qa.answer.trim()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse an import document. JSON when the path ends in `.json`, YAML otherwise.
pub fn load_import_file(path: &Path) -> Result<ImportDocument, PulseError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PulseError::Validation(format!("Failed to read file '{}': {}", path.display(), e))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .map_err(|e| PulseError::Validation(format!("Failed to parse JSON: {}", e)))
    } else {
        serde_yaml_ng::from_str(&content)
            .map_err(|e| PulseError::Validation(format!("Failed to parse YAML: {}", e)))
    }
}

/// Writes survey responses into the record store.
pub struct IngestService {
    store: Arc<dyn RecordStore>,
    excluded_questions: BTreeSet<String>,
}

impl IngestService {
    /// Excluded question names are matched after trimming, like the questions.
    pub fn new(store: Arc<dyn RecordStore>, excluded_questions: BTreeSet<String>) -> Self {
        Self {
            store,
            excluded_questions: excluded_questions
                .iter()
                .map(|q| q.trim().to_string())
                .collect(),
        }
    }

    /// Flatten and upsert every response.
    ///
    /// Duplicate ids within one document are rejected before anything is
    /// written.
    pub async fn import(&self, document: ImportDocument) -> Result<ImportSummary, PulseError> {
        let mut seen = HashSet::new();
        if let Some(dup) = document.responses.iter().find(|r| !seen.insert(r.id)) {
            return Err(PulseError::Validation(format!(
                "Duplicate response id {} in import",
                dup.id
            )));
        }

        let mut skipped = Vec::new();
        let mut records = Vec::with_capacity(document.responses.len());
        for response in &document.responses {
            let text = flatten(response, &self.excluded_questions);
            if text.is_empty() {
                warn!("Skipping response {}: no answers left to store", response.id);
                skipped.push(response.id);
                continue;
            }
            records.push(FeedbackCreate {
                id: response.id,
                text,
                date: response.date.clone(),
            });
        }

        let stats = self.store.upsert_records(records).await?;
        info!(
            "Imported feedback: {} inserted, {} updated, {} unchanged, {} skipped",
            stats.inserted,
            stats.updated,
            stats.unchanged,
            skipped.len()
        );

        Ok(ImportSummary { stats, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedbackRecord;
    use crate::repository::InMemoryRecordStore;
    use pretty_assertions::assert_eq;

    fn qa(question: &str, answer: &str) -> QuestionAnswer {
        QuestionAnswer {
            question: question.into(),
            answer: answer.into(),
        }
    }

    fn response(id: i64, answers: Vec<QuestionAnswer>) -> SurveyResponse {
        SurveyResponse {
            id,
            date: Some("2024-03-01".into()),
            answers,
        }
    }

    #[test]
    fn test_flatten_joins_units() {
        let r = response(1, vec![qa("Pace?", "Fast"), qa(" Food? ", " Good ")]);
        assert_eq!(
            flatten(&r, &BTreeSet::new()),
            "Question: Pace? Answer: Fast; Question: Food? Answer: Good"
        );
    }

    #[test]
    fn test_flatten_skips_excluded_questions() {
        let r = response(
            1,
            vec![qa("Pace?", "Fast"), qa("Email", "a@b.c"), qa("Food?", "Good")],
        );
        let excluded = BTreeSet::from(["Email".to_string()]);
        assert_eq!(
            flatten(&r, &excluded),
            "Question: Pace? Answer: Fast; Question: Food? Answer: Good"
        );
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = r#"
responses:
  - id: 3
    date: "2024-03-01"
    answers:
      - question: "Pace?"
        answer: "Fast"
"#;
        let doc: ImportDocument = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(doc.responses.len(), 1);
        assert_eq!(doc.responses[0].answers[0], qa("Pace?", "Fast"));
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("responses.json");
        std::fs::write(
            &path,
            r#"{"responses":[{"id":1,"answers":[{"question":"Q","answer":"A"}]}]}"#,
        )
        .unwrap();

        let doc = load_import_file(&path).unwrap();
        assert_eq!(doc.responses[0].id, 1);
        assert_eq!(doc.responses[0].date, None);
    }

    #[tokio::test]
    async fn test_import_resets_embedding_on_changed_text() {
        let store = Arc::new(InMemoryRecordStore::with_records(vec![
            FeedbackRecord {
                id: 1,
                text: "Question: Pace? Answer: Fast".into(),
                date: None,
                embedding: vec![1.0, 0.0],
            },
            FeedbackRecord {
                id: 2,
                text: "Question: Pace? Answer: Slow".into(),
                date: None,
                embedding: vec![0.0, 1.0],
            },
        ]));
        let service = IngestService::new(store.clone(), BTreeSet::new());

        let summary = service
            .import(ImportDocument {
                responses: vec![
                    response(1, vec![qa("Pace?", "Fast")]),
                    response(2, vec![qa("Pace?", "Just right")]),
                    response(3, vec![qa("Pace?", "Fast")]),
                    response(4, vec![]),
                ],
            })
            .await
            .unwrap();

        assert_eq!(
            summary.stats,
            UpsertStats {
                inserted: 1,
                updated: 1,
                unchanged: 1,
            }
        );
        assert_eq!(summary.skipped, vec![4]);
        assert!(store.get(1).await.unwrap().is_searchable());
        assert!(store.get(2).await.unwrap().is_embeddable());
        assert!(store.get(3).await.unwrap().is_embeddable());
    }

    #[tokio::test]
    async fn test_exclusions_match_regardless_of_padding() {
        let store = Arc::new(InMemoryRecordStore::new());
        let excluded = BTreeSet::from([" Email ".to_string()]);
        let service = IngestService::new(store.clone(), excluded);

        let summary = service
            .import(ImportDocument {
                responses: vec![
                    response(1, vec![qa("Pace?", "Fast"), qa("Email", "a@b.c")]),
                    response(2, vec![qa("Email ", "d@e.f")]),
                ],
            })
            .await
            .unwrap();

        assert_eq!(summary.skipped, vec![2]);
        assert_eq!(
            store.get(1).await.unwrap().text,
            "Question: Pace? Answer: Fast"
        );
    }

    #[tokio::test]
    async fn test_import_rejects_duplicate_ids() {
        let store = Arc::new(InMemoryRecordStore::new());
        let service = IngestService::new(store.clone(), BTreeSet::new());
        let err = service
            .import(ImportDocument {
                responses: vec![
                    response(1, vec![qa("Q", "A")]),
                    response(1, vec![qa("Q", "B")]),
                ],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::Validation(_)));
        assert!(store.snapshot().await.is_empty());
    }
}
