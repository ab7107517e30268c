//! Task queue repository implementation.
//!
//! All mutual exclusion is enforced by the store: claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent claimers never block on or
//! receive the same row. The in-process worker pool adds no locking of
//! its own on top of this.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use qbank_core::{
    defaults, new_v7, Error, QueueEntry, QueueRepository, QueueStats, Result, TaskStatus,
};

/// PostgreSQL implementation of [`QueueRepository`].
pub struct PgQueueRepository {
    pool: Pool<Postgres>,
    retry_base_delay: Duration,
}

impl PgQueueRepository {
    /// Create a new PgQueueRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            retry_base_delay: Duration::from_secs(defaults::RETRY_BASE_DELAY_SECS),
        }
    }

    /// Override the exponential backoff base delay (default 10s).
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    const ENTRY_COLUMNS: &'static str =
        "id, task_type, payload, status::text AS status, retries, last_error, created_at, updated_at";

    /// Parse a queue row into a QueueEntry.
    fn parse_entry_row(row: sqlx::postgres::PgRow) -> QueueEntry {
        let status: String = row.get("status");
        QueueEntry {
            id: row.get("id"),
            task_type: row.get("task_type"),
            payload: row.get("payload"),
            status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Ready),
            retries: row.get("retries"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn enqueue(&self, task_type: &str, payload: JsonValue) -> Result<Uuid> {
        let entry_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO task_queue (id, task_type, payload, status, retries, created_at, updated_at)
             VALUES ($1, $2, $3, 'ready'::task_status, 0, $4, $4)",
        )
        .bind(entry_id)
        .bind(task_type)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "queue",
            op = "enqueue",
            entry_id = %entry_id,
            task_type,
            "Enqueued task"
        );
        Ok(entry_id)
    }

    async fn claim_ready(&self) -> Result<Option<QueueEntry>> {
        let now = Utc::now();

        // FOR UPDATE SKIP LOCKED: rows claimed by a concurrent transaction
        // are skipped instead of waited on, so no two callers ever receive
        // the same entry.
        let query = format!(
            "UPDATE task_queue
             SET status = 'processing'::task_status, updated_at = $1
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE status = 'ready'::task_status
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            Self::ENTRY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_entry_row))
    }

    async fn claim_failed_for_retry(&self, max_retries: i32) -> Result<Option<QueueEntry>> {
        let now = Utc::now();

        // Eligibility gate: updated_at + base * 2^retries <= now().
        // retries=0 waits one base delay, retries=1 two, retries=2 four.
        let query = format!(
            "UPDATE task_queue
             SET status = 'processing'::task_status, updated_at = $1
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE status = 'failed'::task_status
                   AND retries < $2
                   AND updated_at + (POWER(2, retries) * ($3 * INTERVAL '1 second')) <= NOW()
                 ORDER BY updated_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            Self::ENTRY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(max_retries)
            .bind(self.retry_base_delay.as_secs_f64())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_entry_row))
    }

    async fn mark_completed(&self, entry_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE task_queue
             SET status = 'completed'::task_status, updated_at = $1
             WHERE id = $2 AND status = 'processing'::task_status",
        )
        .bind(Utc::now())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // The entry was reclaimed while we were finishing — the benign
            // at-least-once race documented on reclaim_stuck.
            warn!(
                subsystem = "db",
                component = "queue",
                op = "mark_completed",
                entry_id = %entry_id,
                "Entry was no longer processing when completion was recorded"
            );
        }
        Ok(())
    }

    async fn mark_failed(&self, entry_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE task_queue
             SET status = 'failed'::task_status,
                 last_error = $1,
                 retries = retries + 1,
                 updated_at = $2
             WHERE id = $3 AND status = 'processing'::task_status",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            warn!(
                subsystem = "db",
                component = "queue",
                op = "mark_failed",
                entry_id = %entry_id,
                "Entry was no longer processing when failure was recorded"
            );
        }
        Ok(())
    }

    async fn reclaim_stuck(&self, timeout: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout)
                .map_err(|e| Error::InvalidInput(format!("Invalid reclaim timeout: {}", e)))?;

        let result = sqlx::query(
            "UPDATE task_queue
             SET status = 'ready'::task_status, updated_at = $1
             WHERE status = 'processing'::task_status AND updated_at < $2",
        )
        .bind(Utc::now())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<QueueEntry>> {
        let query = format!(
            "SELECT {} FROM task_queue WHERE id = $1",
            Self::ENTRY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_entry_row))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'ready'::task_status) AS ready,
                 COUNT(*) FILTER (WHERE status = 'processing'::task_status) AS processing,
                 COUNT(*) FILTER (WHERE status = 'completed'::task_status) AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed'::task_status) AS failed,
                 COUNT(*) AS total
             FROM task_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            ready: row.get("ready"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            total: row.get("total"),
        })
    }
}
