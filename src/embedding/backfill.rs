//! Backfill embedding generation for feedback records.
//!
//! Selects every record whose embedding is empty, splits the selection into
//! fixed-size batches and embeds them with bounded parallelism. Each batch
//! makes one model call and one store update per record; failures are
//! isolated to the record (update) or batch (model) they happened in.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::embedding::provider::EmbeddingMetadata;
use crate::embedding::{ensure_aligned, EmbeddingService};
use crate::models::PendingRecord;
use crate::repository::RecordStore;
use crate::services::progress::{noop_progress, ProgressReporter};
use crate::PulseError;

/// Tuning for a backfill run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Records per model call.
    pub batch_size: usize,
    /// Batches allowed in flight at once.
    pub max_parallel_batches: usize,
    /// Wall-clock budget; unfinished batches are aborted once it elapses.
    pub deadline: Option<Duration>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_parallel_batches: 4,
            deadline: None,
        }
    }
}

impl BackfillConfig {
    pub fn validate(&self) -> Result<(), PulseError> {
        if self.batch_size == 0 {
            return Err(PulseError::Validation(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_batches == 0 {
            return Err(PulseError::Validation(
                "max_parallel_batches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A record the backfill could not embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub id: i64,
    pub reason: String,
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub size: usize,
    pub updated: usize,
    pub failed: Vec<FailedRecord>,
    /// Set when the whole batch failed (model error or panic).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    fn whole_batch_failed(index: usize, ids: &[i64], reason: String) -> Self {
        Self {
            index,
            size: ids.len(),
            updated: 0,
            failed: ids
                .iter()
                .map(|&id| FailedRecord {
                    id,
                    reason: reason.clone(),
                })
                .collect(),
            error: Some(reason),
        }
    }
}

/// Summary of a backfill run.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    /// Records found with an empty embedding.
    pub selected: usize,
    pub batch_sizes: Vec<usize>,
    /// Finished batches ordered by index.
    pub batches: Vec<BatchOutcome>,
    pub updated: usize,
    pub failed: usize,
    /// Indexes of batches aborted by the deadline.
    pub cancelled_batches: Vec<usize>,
    /// Records in cancelled batches that were never written; they stay
    /// embeddable. Writes made before the abort count toward `updated`.
    pub cancelled_records: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BackfillReport {
    /// True when every selected record was embedded.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.cancelled_batches.is_empty()
    }
}

/// Split records into contiguous batches of `batch_size`.
///
/// Every batch is full except possibly the last, which is never dropped.
/// `batch_size` must be non-zero.
pub fn partition_batches(records: Vec<PendingRecord>, batch_size: usize) -> Vec<Vec<PendingRecord>> {
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size.max(1)));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(batch_size.max(1)).collect());
    }
    batches
}

/// Service for backfilling embeddings across the feedback corpus.
pub struct BackfillService {
    store: Arc<dyn RecordStore>,
    embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    config: BackfillConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl BackfillService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            store,
            embedding_service,
            config,
            progress: noop_progress(),
        }
    }

    /// Report finished batches to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Check the configuration and that the model is loaded.
    pub fn ensure_ready(&self) -> Result<(), PulseError> {
        self.config.validate()?;

        if !self.embedding_service.is_available() {
            return Err(PulseError::Model(
                "Embedding service not available - cannot backfill".to_string(),
            ));
        }
        Ok(())
    }

    /// Clear every stored embedding ahead of a full re-embed.
    ///
    /// Refuses when the backfill could not run afterwards, so a missing model
    /// never leaves the corpus without vectors.
    pub async fn reset_embeddings(&self) -> Result<usize, PulseError> {
        self.ensure_ready()?;
        let cleared = self.store.reset_embeddings().await?;
        info!("Cleared {} stored embeddings", cleared);
        Ok(cleared)
    }

    /// Embed every record whose embedding is empty.
    ///
    /// Only fails before any batch runs: bad configuration, model not
    /// loaded, or the initial selection query failing. Everything after that
    /// is reported per batch in the returned [`BackfillReport`].
    pub async fn run(&self) -> Result<BackfillReport, PulseError> {
        self.ensure_ready()?;

        let started_at = Utc::now();
        let deadline_at = self
            .config
            .deadline
            .map(|d| tokio::time::Instant::now() + d);

        let pending = self.store.fetch_unembedded().await?;
        let selected = pending.len();
        let batches = partition_batches(pending, self.config.batch_size);
        let batch_sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        let total_batches = batches.len();

        info!(
            "Backfilling {} records in {} batches (batch size {}, {} in parallel)",
            selected, total_batches, self.config.batch_size, self.config.max_parallel_batches
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_batches));
        let written: Vec<WrittenIds> = (0..total_batches).map(|_| WrittenIds::default()).collect();
        let mut tasks = JoinSet::new();
        for (index, batch) in batches.into_iter().enumerate() {
            tasks.spawn(run_batch_task(
                index,
                batch,
                Arc::clone(&self.store),
                Arc::clone(&self.embedding_service),
                Arc::clone(&semaphore),
                written[index].clone(),
            ));
        }

        let mut outcomes: Vec<BatchOutcome> = Vec::with_capacity(total_batches);
        let mut timed_out = false;
        loop {
            let next = match deadline_at {
                Some(at) if !timed_out => match tokio::time::timeout_at(at, tasks.join_next()).await
                {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "Backfill deadline elapsed, aborting {} unfinished batches",
                            tasks.len()
                        );
                        timed_out = true;
                        tasks.abort_all();
                        continue;
                    }
                },
                _ => tasks.join_next().await,
            };

            match next {
                None => break,
                Some(Ok(outcome)) => {
                    outcomes.push(outcome);
                    let done = outcomes.len();
                    self.progress
                        .units(
                            done,
                            total_batches,
                            &format!("Embedded batch {}/{}", done, total_batches),
                        )
                        .await;
                }
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => warn!("Backfill batch task failed to join: {}", e),
            }
        }

        outcomes.sort_by_key(|o| o.index);
        let finished: BTreeSet<usize> = outcomes.iter().map(|o| o.index).collect();
        let cancelled_batches: Vec<usize> = (0..total_batches)
            .filter(|i| !finished.contains(i))
            .collect();
        // Aborted batches may have written part of their records already
        let written_before_abort: usize = cancelled_batches
            .iter()
            .map(|&i| written[i].count())
            .sum();
        let cancelled_records = cancelled_batches
            .iter()
            .map(|&i| batch_sizes[i])
            .sum::<usize>()
            - written_before_abort;

        let updated: usize =
            outcomes.iter().map(|o| o.updated).sum::<usize>() + written_before_abort;
        let failed: usize = outcomes.iter().map(|o| o.failed.len()).sum();

        info!(
            "Backfill complete: {} selected, {} updated, {} failed, {} batches cancelled",
            selected,
            updated,
            failed,
            cancelled_batches.len()
        );

        if updated > 0 {
            let meta = EmbeddingMetadata::for_service(self.embedding_service.as_ref());
            if let Err(e) = self.store.record_embedding_metadata(meta).await {
                warn!("Failed to update embedding metadata: {}", e);
            }
        }

        Ok(BackfillReport {
            selected,
            batch_sizes,
            batches: outcomes,
            updated,
            failed,
            cancelled_batches,
            cancelled_records,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Ids a batch has written so far. Shared with the coordinator so writes
/// made before an abort or a panic are still accounted for.
#[derive(Clone, Default)]
struct WrittenIds(Arc<Mutex<Vec<i64>>>);

impl WrittenIds {
    fn push(&self, id: i64) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(id);
    }

    fn snapshot(&self) -> Vec<i64> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn count(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Wait for a permit, then embed one batch. A panic inside the batch becomes
/// a failed outcome instead of a join error.
async fn run_batch_task(
    index: usize,
    batch: Vec<PendingRecord>,
    store: Arc<dyn RecordStore>,
    embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    semaphore: Arc<Semaphore>,
    written: WrittenIds,
) -> BatchOutcome {
    let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();

    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return BatchOutcome::whole_batch_failed(index, &ids, e.to_string()),
    };

    match AssertUnwindSafe(embed_batch(
        index,
        batch,
        store,
        embedding_service,
        written.clone(),
    ))
    .catch_unwind()
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Backfill batch {} panicked", index);
            let done = written.snapshot();
            let unwritten: Vec<i64> = ids.iter().copied().filter(|id| !done.contains(id)).collect();
            BatchOutcome {
                size: ids.len(),
                updated: done.len(),
                ..BatchOutcome::whole_batch_failed(
                    index,
                    &unwritten,
                    "batch task panicked".to_string(),
                )
            }
        }
    }
}

async fn embed_batch(
    index: usize,
    batch: Vec<PendingRecord>,
    store: Arc<dyn RecordStore>,
    embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    written: WrittenIds,
) -> BatchOutcome {
    let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
    let texts: Vec<String> = batch.into_iter().map(|r| r.text).collect();

    let embeddings = match embedding_service.embed(&texts).await.and_then(|embeddings| {
        ensure_aligned(texts.len(), &embeddings)?;
        Ok(embeddings)
    }) {
        Ok(embeddings) => embeddings,
        Err(e) => {
            warn!(
                "Failed to generate embeddings for batch {} ({} records): {}",
                index,
                ids.len(),
                e
            );
            return BatchOutcome::whole_batch_failed(index, &ids, e.to_string());
        }
    };

    let mut updated = 0;
    let mut failed = Vec::new();
    for (id, embedding) in ids.iter().copied().zip(embeddings) {
        match store.update_embedding(id, embedding).await {
            Ok(()) => {
                written.push(id);
                updated += 1;
            }
            Err(e) => {
                warn!("Failed to update embedding for feedback {}: {}", id, e);
                failed.push(FailedRecord {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    BatchOutcome {
        index,
        size: ids.len(),
        updated,
        failed,
        error: None,
    }
}
