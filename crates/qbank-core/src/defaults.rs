//! Centralized default constants for the qbank system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// DEDUPLICATION
// =============================================================================

/// Inner-product distance below which a new question is merged into the
/// nearest existing article instead of inserted. Distances are negative for
/// similar unit vectors; -0.95 encodes a near-identity requirement.
pub const MERGE_THRESHOLD: f64 = -0.95;

// =============================================================================
// RETRY / BACKOFF
// =============================================================================

/// Base delay for the exponential retry backoff. A failed entry becomes
/// eligible for retry after `RETRY_BASE_DELAY_SECS * 2^retries` seconds.
pub const RETRY_BASE_DELAY_SECS: u64 = 10;

/// Maximum retry attempts before an entry stays failed permanently.
pub const MAX_RETRIES: i32 = 3;

// =============================================================================
// WORKER POOL
// =============================================================================

/// Number of pollers claiming from the ready lane.
pub const WORKER_NORMAL_POLLERS: usize = 2;

/// Number of pollers claiming from the failed/retry lane.
pub const WORKER_RETRY_POLLERS: usize = 1;

/// Process-wide ceiling on concurrently executing pipelines.
pub const WORKER_MAX_CONCURRENT: usize = 3;

/// Polling interval for each worker lane in milliseconds.
pub const WORKER_POLL_INTERVAL_MS: u64 = 1000;

/// Age after which a `processing` entry is considered abandoned and is
/// reverted to `ready` by the reclaimer.
pub const STUCK_TIMEOUT_SECS: u64 = 300;

/// Interval between stuck-task reclaim passes.
pub const RECLAIM_INTERVAL_SECS: u64 = 60;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default page size for article listing.
pub const PAGE_LIMIT: i64 = 20;

/// Maximum page size accepted from clients.
pub const PAGE_LIMIT_MAX: i64 = 100;
