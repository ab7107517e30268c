//! # qbank-core
//!
//! Core types, traits, and abstractions for qbank.
//!
//! This crate provides:
//! - The task/queue/article data model and the queue status state machine
//! - Repository traits implemented by the PostgreSQL layer
//! - Backend traits for the enrichment and embedding collaborators
//! - The shared error type and centralized default constants

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

pub use error::{Error, Result};
pub use models::{
    backoff_delay, new_v7, Article, DedupOutcome, EnrichedQuestion, EnrichedQuestionSet,
    NewArticle, QueueEntry, QueueStats, Task, TaskStatus,
};
pub use traits::{
    ArticleRepository, EmbeddingBackend, EnrichmentBackend, GenerationBackend, QueueRepository,
    SubmitRequest,
};

/// Embedding vector type shared with the pgvector storage layer.
pub use pgvector::Vector;
