//! Repository and backend traits.
//!
//! The durable store is the sole source of mutual exclusion for queue
//! entries; implementations of [`QueueRepository::claim_ready`] and
//! [`QueueRepository::claim_failed_for_retry`] must guarantee that no two
//! concurrent callers ever receive the same entry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    Article, EnrichedQuestion, EnrichedQuestionSet, NewArticle, QueueEntry, QueueStats, Result,
};

/// Durable, transactionally-safe queue of pending work.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Create a `ready` entry wrapping the given payload.
    async fn enqueue(&self, task_type: &str, payload: JsonValue) -> Result<Uuid>;

    /// Claim the oldest `ready` entry, flipping it to `processing`.
    ///
    /// Rows already claimed by a concurrent caller are skipped, never
    /// waited on. Returns `None` when no entry is available.
    async fn claim_ready(&self) -> Result<Option<QueueEntry>>;

    /// Claim the oldest-updated `failed` entry that has retries left and
    /// whose backoff delay has elapsed, flipping it to `processing`.
    async fn claim_failed_for_retry(&self, max_retries: i32) -> Result<Option<QueueEntry>>;

    /// Mark a claimed entry `completed`.
    async fn mark_completed(&self, entry_id: Uuid) -> Result<()>;

    /// Mark a claimed entry `failed`, incrementing its retry count and
    /// recording the error text.
    async fn mark_failed(&self, entry_id: Uuid, error: &str) -> Result<()>;

    /// Revert `processing` entries older than `timeout` back to `ready`.
    ///
    /// Best-effort crash recovery; may race benignly with a worker that is
    /// about to finish (at-least-once delivery). Returns the number of
    /// entries reclaimed.
    async fn reclaim_stuck(&self, timeout: Duration) -> Result<u64>;

    /// Fetch an entry by id.
    async fn get(&self, entry_id: Uuid) -> Result<Option<QueueEntry>>;

    /// Queue counts per status.
    async fn stats(&self) -> Result<QueueStats>;
}

/// Persisted article store with nearest-neighbor lookup.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert a new article with an empty `ext` list; returns its id.
    async fn insert(&self, article: NewArticle) -> Result<Uuid>;

    /// The single nearest stored article by inner-product distance
    /// (more negative = more similar for unit vectors), with that distance.
    /// `None` if no articles exist yet.
    async fn find_closest(&self, vector: &Vector) -> Result<Option<(Article, f64)>>;

    /// Append a merged duplicate to an article's `ext` list.
    async fn append_ext(&self, article_id: Uuid, question: &EnrichedQuestion) -> Result<()>;

    /// Fetch an article by id.
    async fn get(&self, article_id: Uuid) -> Result<Option<Article>>;

    /// Tag-filtered page of articles, newest first, plus the total count.
    /// An empty `tags` slice applies no filter.
    async fn list(&self, tags: &[String], limit: i64, offset: i64)
        -> Result<(Vec<Article>, i64)>;

    /// Nearest articles to a query vector, most similar first.
    async fn search_similar(&self, vector: &Vector, limit: i64) -> Result<Vec<(Article, f64)>>;

    /// Nearest articles to a stored article, excluding the article itself.
    async fn similar_to(&self, article_id: Uuid, limit: i64) -> Result<Vec<(Article, f64)>>;

    /// All distinct tags across stored articles.
    async fn all_tags(&self) -> Result<Vec<String>>;
}

/// Raw text generation collaborator.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Question enrichment collaborator.
///
/// Fails on empty or unparseable model output; an empty question set is an
/// error, not a valid result.
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    /// Turn one raw question blob into an ordered set of enriched questions.
    async fn enrich(&self, raw_questions: &str) -> Result<EnrichedQuestionSet>;
}

/// Vector embedding collaborator.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// Implementations must return exactly one vector per input text, in
    /// input order, each L2-normalized to unit length (inner product only
    /// equals cosine similarity for unit vectors).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Submission parameters accepted from the outside world.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub raw_questions: String,
    pub source: Option<String>,
    pub metadata: Option<HashMap<String, JsonValue>>,
}
