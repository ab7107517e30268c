//! # qbank-db
//!
//! PostgreSQL database layer for qbank.
//!
//! This crate provides:
//! - Connection pool management
//! - The task queue repository (skip-locked claims, backoff-gated retry
//!   claims, stuck-task reclaim)
//! - The article repository with pgvector inner-product nearest-neighbor
//!   lookup
//! - The deduplication engine deciding merge-vs-insert per enriched question
//!
//! ## Example
//!
//! ```rust,ignore
//! use qbank_db::Database;
//! use qbank_core::QueueRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/qbank").await?;
//!     let entry_id = db
//!         .queue
//!         .enqueue("enrich_questions", serde_json::json!({}))
//!         .await?;
//!     println!("Enqueued: {}", entry_id);
//!     Ok(())
//! }
//! ```

pub mod articles;
pub mod dedup;
pub mod pool;
pub mod queue;

// Re-export core types
pub use qbank_core::*;

pub use articles::PgArticleRepository;
pub use dedup::DedupEngine;
pub use pool::{create_pool, PoolConfig};
pub use queue::PgQueueRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Task queue repository.
    pub queue: PgQueueRepository,
    /// Article repository for deduplicated knowledge entries.
    pub articles: PgArticleRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            queue: PgQueueRepository::new(pool.clone()),
            articles: PgArticleRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = config.connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
