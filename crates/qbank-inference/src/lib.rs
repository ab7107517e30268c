//! # qbank-inference
//!
//! LLM collaborator implementations for qbank.
//!
//! This crate provides:
//! - The Ollama backend implementing both collaborator contracts:
//!   batch embedding (with client-side L2 normalization) and text
//!   generation
//! - The question enricher turning raw question blobs into structured,
//!   tagged question sets via a prompt template and JSON parsing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use qbank_inference::{OllamaBackend, QuestionEnricher};
//! use qbank_core::{EmbeddingBackend, EnrichmentBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(OllamaBackend::from_env());
//!     let enricher = QuestionEnricher::new(backend.clone());
//!
//!     let set = enricher.enrich("what is a deadlock").await.unwrap();
//!     let vectors = backend.embed_batch(&set.embeddable_texts()).await.unwrap();
//!     assert_eq!(vectors.len(), set.len());
//! }
//! ```

pub mod enricher;
pub mod ollama;
pub mod prompt;

// Re-export core types
pub use qbank_core::*;

pub use enricher::QuestionEnricher;
pub use ollama::{l2_normalize, OllamaBackend};
pub use prompt::{PromptTemplate, DEFAULT_ENRICH_TEMPLATE};
