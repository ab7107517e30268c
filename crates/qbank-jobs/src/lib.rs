//! # qbank-jobs
//!
//! Durable task queue processing for qbank.
//!
//! This crate provides:
//! - The per-task pipeline (deserialize → enrich → embed → dedup →
//!   finalize) with failure recording on every abort path
//! - A worker pool with separate normal and retry poll lanes under one
//!   shared concurrency ceiling, plus a stuck-task reclaimer
//! - The task submission entry point used by the HTTP layer
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qbank_db::{Database, DedupEngine};
//! use qbank_inference::{OllamaBackend, QuestionEnricher};
//! use qbank_jobs::{TaskPipeline, WorkerPool, WorkerPoolConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let backend = Arc::new(OllamaBackend::from_env());
//! let queue = Arc::new(db.queue);
//! let articles = Arc::new(db.articles);
//!
//! let pipeline = Arc::new(TaskPipeline::new(
//!     queue.clone(),
//!     Arc::new(QuestionEnricher::new(backend.clone())),
//!     backend,
//!     DedupEngine::new(articles),
//! ));
//!
//! let handle = WorkerPool::new(queue, pipeline, WorkerPoolConfig::from_env()).start();
//! // ... on shutdown:
//! handle.shutdown().await;
//! ```

pub mod pipeline;
pub mod worker;

// Re-export core types
pub use qbank_core::*;

pub use pipeline::{submit, PipelineOutcome, TaskPipeline, TASK_TYPE_ENRICH_QUESTIONS};
pub use worker::{WorkerHandle, WorkerPool, WorkerPoolConfig};

/// Default maximum retries for failed tasks.
pub const DEFAULT_MAX_RETRIES: i32 = qbank_core::defaults::MAX_RETRIES;

/// Default polling interval for task processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = qbank_core::defaults::WORKER_POLL_INTERVAL_MS;
