//! Structured logging field name constants for qbank.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "queue", "dedup", "ollama", "pool", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_ready", "enrich", "embed_batch", "process"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Queue entry UUID being operated on.
pub const ENTRY_ID: &str = "entry_id";

/// Task UUID carried in a queue entry payload.
pub const TASK_ID: &str = "task_id";

/// Article UUID produced or updated by deduplication.
pub const ARTICLE_ID: &str = "article_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of enriched questions produced for a task.
pub const QUESTION_COUNT: &str = "question_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Inner-product distance of the nearest stored article.
pub const DISTANCE: &str = "distance";

/// Retry count of a queue entry.
pub const RETRIES: &str = "retries";
