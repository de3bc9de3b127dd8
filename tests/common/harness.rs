//! Test harness for database lifecycle management.
//!
//! Provides isolated database instances per test using tempfile.

use std::sync::Arc;
use tempfile::TempDir;

use pulse::db::connection::{init_db, DbConfig, PulseDb};
use pulse::db::schema::apply_schema;
use pulse::embedding::EmbeddingService;
use pulse::models::FeedbackCreate;
use pulse::repository::{RecordStore, SurrealRecordStore};

/// Test harness that manages database lifecycle.
///
/// Each TestHarness creates an isolated database in a temporary directory.
/// The database is automatically cleaned up when the harness is dropped.
pub struct TestHarness {
    pub db: Arc<PulseDb>,
    pub store: Arc<SurrealRecordStore>,
    /// Temporary directory (kept alive while harness exists)
    pub temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with isolated database.
    ///
    /// Panics if database initialization fails (appropriate for tests).
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory for test database");

        let db_path = temp_dir.path().join("test.db");
        let config = DbConfig::Embedded {
            path: Some(db_path.to_string_lossy().into_owned()),
        };
        let db = init_db(&config, temp_dir.path())
            .await
            .expect("Failed to initialize test database");

        apply_schema(&db)
            .await
            .expect("Failed to apply schema to test database");

        let db = Arc::new(db);
        Self {
            store: Arc::new(SurrealRecordStore::new(db.clone())),
            db,
            temp_dir,
        }
    }

    /// The store as a trait object, for wiring services.
    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// Insert records `Question: Q{id} Answer: A{id}` for every id in `ids`.
    pub async fn seed(&self, ids: impl IntoIterator<Item = i64>) {
        let records = ids
            .into_iter()
            .map(|id| FeedbackCreate {
                id,
                text: format!("Question: Q{id} Answer: A{id}"),
                date: None,
            })
            .collect();
        self.store
            .upsert_records(records)
            .await
            .expect("Failed to seed feedback");
    }

    /// Insert records with the given texts, ids starting at 1.
    pub async fn seed_texts(&self, texts: &[&str]) {
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, text)| FeedbackCreate {
                id: i as i64 + 1,
                text: text.to_string(),
                date: Some("2024-03-01".into()),
            })
            .collect();
        self.store
            .upsert_records(records)
            .await
            .expect("Failed to seed feedback");
    }

    /// Ids of records that are still waiting for an embedding.
    pub async fn unembedded_ids(&self) -> Vec<i64> {
        self.store
            .fetch_unembedded()
            .await
            .expect("Failed to fetch unembedded records")
            .into_iter()
            .map(|r| r.id)
            .collect()
    }
}

/// Coerce a concrete embedder into the shared trait object.
pub fn shared<E: EmbeddingService + 'static>(embedder: E) -> Arc<dyn EmbeddingService + Send + Sync> {
    Arc::new(embedder)
}
