use crate::db::connection::PulseDb;
use crate::PulseError;

/// Feedback table: text, optional date, embedding vector and timestamps
const SCHEMA_001: &str = include_str!("migrations/001_feedback.surql");

/// Embedding metadata: pulse_meta table for model/dimensions/provider tracking
const SCHEMA_002: &str = include_str!("migrations/002_embedding_metadata.surql");

/// Apply the database schema to an initialized database connection.
///
/// Migrations are applied in order:
/// - 001: Feedback records (text, date, embedding, embedded_at, ingested_at)
/// - 002: Embedding metadata (pulse_meta table)
///
/// Safe to call multiple times; every statement is `IF NOT EXISTS`.
///
/// # Example
///
/// ```no_run
/// # use pulse::db::{connection::{init_db, DbConfig}, schema::apply_schema};
/// # use std::path::Path;
/// # async fn example() -> Result<(), pulse::PulseError> {
/// let config = DbConfig::Embedded { path: Some("./data/pulse.db".into()) };
/// let db = init_db(&config, Path::new("./data")).await?;
/// apply_schema(&db).await?;
/// # Ok(())
/// # }
/// ```
pub async fn apply_schema(db: &PulseDb) -> Result<(), PulseError> {
    db.query(SCHEMA_001).await?.check()?;
    db.query(SCHEMA_002).await?.check()?;
    Ok(())
}
