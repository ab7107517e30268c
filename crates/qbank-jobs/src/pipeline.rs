//! Per-task processing pipeline.
//!
//! Runs once per claimed queue entry, synchronously:
//! deserialize → enrich → embed → dedup each produced item → finalize.
//! Any failure marks the entry failed and aborts; items already merged or
//! inserted before the failure are not rolled back (there is no
//! transactional envelope spanning multiple items).

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use qbank_core::{
    DedupOutcome, EmbeddingBackend, EnrichmentBackend, Error, QueueEntry, QueueRepository, Result,
    SubmitRequest, Task,
};
use qbank_db::DedupEngine;

/// Queue task type under which question batches are submitted.
pub const TASK_TYPE_ENRICH_QUESTIONS: &str = "enrich_questions";

/// Counts of dedup decisions made while processing one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub inserted: usize,
    pub merged: usize,
}

/// Executes claimed queue entries against the collaborators and the store.
pub struct TaskPipeline {
    queue: Arc<dyn QueueRepository>,
    enrichment: Arc<dyn EnrichmentBackend>,
    embedding: Arc<dyn EmbeddingBackend>,
    dedup: DedupEngine,
}

impl TaskPipeline {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        enrichment: Arc<dyn EnrichmentBackend>,
        embedding: Arc<dyn EmbeddingBackend>,
        dedup: DedupEngine,
    ) -> Self {
        Self {
            queue,
            enrichment,
            embedding,
            dedup,
        }
    }

    /// Process one claimed entry to a terminal state.
    ///
    /// On success the entry is marked completed. On any failure the entry
    /// is marked failed (incrementing its retry count) and the error is
    /// returned; a failure of `mark_failed` itself is logged and not
    /// compensated further.
    pub async fn execute(&self, entry: &QueueEntry) -> Result<PipelineOutcome> {
        let start = Instant::now();

        match self.run(entry).await {
            Ok(outcome) => {
                // A completion-write failure is a store error, not a task
                // failure; it must not burn a retry.
                self.queue.mark_completed(entry.id).await?;
                info!(
                    subsystem = "jobs",
                    component = "pipeline",
                    op = "execute",
                    entry_id = %entry.id,
                    inserted = outcome.inserted,
                    merged = outcome.merged,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Task completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    op = "execute",
                    entry_id = %entry.id,
                    error = %err,
                    retryable = err.is_retryable(),
                    retries = entry.retries,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Task failed"
                );
                if let Err(mark_err) = self.queue.mark_failed(entry.id, &err.to_string()).await {
                    error!(
                        subsystem = "jobs",
                        component = "pipeline",
                        op = "mark_failed",
                        entry_id = %entry.id,
                        error = %mark_err,
                        "Failed to record task failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// The pipeline body, up to but excluding the completion write.
    async fn run(&self, entry: &QueueEntry) -> Result<PipelineOutcome> {
        // A payload that does not parse will never parse; the failure is
        // terminal but still recorded through the ordinary failed state.
        let task = Task::from_payload(&entry.payload)?;

        let set = self.enrichment.enrich(&task.raw_questions).await?;

        let texts = set.embeddable_texts();
        let vectors = self.embedding.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding count ({}) does not match text count ({})",
                vectors.len(),
                texts.len()
            )));
        }

        let mut outcome = PipelineOutcome::default();
        for (question, vector) in set.questions.iter().zip(vectors) {
            // First failure aborts the remaining pairs; completed merges
            // and inserts stay in place.
            match self.dedup.process(question, vector).await? {
                DedupOutcome::Inserted { .. } => outcome.inserted += 1,
                DedupOutcome::Merged { .. } => outcome.merged += 1,
            }
        }

        info!(
            subsystem = "jobs",
            component = "pipeline",
            op = "run",
            entry_id = %entry.id,
            task_id = %task.task_id,
            source = %task.source,
            question_count = set.len(),
            "Processed question batch"
        );
        Ok(outcome)
    }
}

/// Submit a batch of raw questions for asynchronous processing.
///
/// Builds a [`Task`] (filling id, timestamp, and source defaults) and
/// enqueues it; returns the queue entry id, the durable handle for status
/// lookups.
pub async fn submit(queue: &dyn QueueRepository, request: SubmitRequest) -> Result<Uuid> {
    if request.raw_questions.trim().is_empty() {
        return Err(Error::InvalidInput("raw_questions must not be empty".into()));
    }

    let task = Task::new(request.raw_questions, request.source, request.metadata);
    let payload = task.to_payload()?;
    let entry_id = queue.enqueue(TASK_TYPE_ENRICH_QUESTIONS, payload).await?;

    info!(
        subsystem = "jobs",
        component = "pipeline",
        op = "submit",
        entry_id = %entry_id,
        task_id = %task.task_id,
        source = %task.source,
        "Task submitted"
    );
    Ok(entry_id)
}
