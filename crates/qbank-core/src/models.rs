//! Domain models for qbank.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{defaults, Result};

/// Generate a time-ordered UUIDv7 identifier.
///
/// UUIDv7 embeds a Unix timestamp, so identifiers sort chronologically,
/// which keeps `ORDER BY id` consistent with insertion order.
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

// =============================================================================
// QUEUE
// =============================================================================

/// Status of an entry in the task queue.
///
/// The lifecycle is a closed state machine:
/// `Ready -> Processing -> Completed | Failed`, with `Failed -> Processing`
/// for the retry lane and `Processing -> Ready` for stuck-task reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ready,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Database/text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse the database/text representation.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "ready" => Some(TaskStatus::Ready),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Ready, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Ready)
                | (Failed, Processing)
        )
    }

}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted unit of work: one batch of raw question text.
///
/// Immutable after creation; stored as the queue entry payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub raw_questions: String,
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

impl Task {
    /// Create a task, filling identifier, timestamp, and source defaults.
    pub fn new(
        raw_questions: String,
        source: Option<String>,
        metadata: Option<HashMap<String, JsonValue>>,
    ) -> Self {
        Self {
            raw_questions,
            task_id: new_v7(),
            created_at: Utc::now(),
            source: source
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "default".to_string()),
            metadata: metadata.unwrap_or_default(),
        }
    }

    /// Serialize for storage as a queue entry payload.
    pub fn to_payload(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from a queue entry payload.
    pub fn from_payload(payload: &JsonValue) -> Result<Task> {
        Ok(serde_json::from_value(payload.clone())?)
    }
}

/// A persisted queue row wrapping a serialized [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub task_type: String,
    pub payload: JsonValue,
    pub status: TaskStatus,
    pub retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimum wait before a failed entry becomes eligible for retry.
///
/// `RETRY_BASE_DELAY_SECS * 2^retries`: 10s, 20s, 40s, ...
pub fn backoff_delay(retries: i32) -> Duration {
    let exp = retries.clamp(0, 30) as u32;
    Duration::from_secs(defaults::RETRY_BASE_DELAY_SECS) * 2u32.pow(exp)
}

/// Queue counts per status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub ready: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

// =============================================================================
// ENRICHMENT
// =============================================================================

/// One question after enrichment by the generation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedQuestion {
    pub original_question: String,
    pub detailed_question: String,
    pub concise_answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Ordered set of enriched questions produced from one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichedQuestionSet {
    pub questions: Vec<EnrichedQuestion>,
}

impl EnrichedQuestionSet {
    /// Text handed to the embedding model, one entry per question:
    /// detailed rephrasing and concise answer separated by a blank line.
    pub fn embeddable_texts(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|q| format!("{}\n\n{}", q.detailed_question, q.concise_answer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

// =============================================================================
// ARTICLES
// =============================================================================

/// A persisted knowledge entry.
///
/// The embedding is set once at creation and never recomputed; merged
/// duplicate questions accumulate in `ext` in merge order.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: Uuid,
    pub original_question: String,
    pub detailed_question: Option<String>,
    pub concise_answer: Option<String>,
    pub tags: Vec<String>,
    pub embedding: Vector,
    pub ext: Vec<EnrichedQuestion>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub original_question: String,
    pub detailed_question: Option<String>,
    pub concise_answer: Option<String>,
    pub tags: Vec<String>,
    pub embedding: Vector,
}

impl NewArticle {
    /// Map an enriched question and its embedding onto an insertable article.
    pub fn from_question(question: &EnrichedQuestion, embedding: Vector) -> Self {
        Self {
            original_question: question.original_question.clone(),
            detailed_question: Some(question.detailed_question.clone()),
            concise_answer: Some(question.concise_answer.clone()),
            tags: question.tags.clone(),
            embedding,
        }
    }
}

/// Result of processing one enriched question through deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// A new article was created.
    Inserted { article_id: Uuid },
    /// The question was appended to an existing article's `ext` list.
    Merged { article_id: Uuid },
}

impl DedupOutcome {
    pub fn article_id(&self) -> Uuid {
        match self {
            DedupOutcome::Inserted { article_id } | DedupOutcome::Merged { article_id } => {
                *article_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TaskStatus::Ready,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn test_legal_transitions() {
        use TaskStatus::*;
        assert!(Ready.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
        // Reclaim path for crashed workers.
        assert!(Processing.can_transition_to(Ready));
    }

    #[test]
    fn test_illegal_transitions() {
        use TaskStatus::*;
        assert!(!Ready.can_transition_to(Completed));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Ready));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0), Duration::from_secs(10));
        assert_eq!(backoff_delay(1), Duration::from_secs(20));
        assert_eq!(backoff_delay(2), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_clamps_negative_and_large() {
        assert_eq!(backoff_delay(-1), Duration::from_secs(10));
        // Large retry counts must not overflow the multiplication.
        let huge = backoff_delay(i32::MAX);
        assert_eq!(huge, Duration::from_secs(10) * 2u32.pow(30));
    }

    #[test]
    fn test_task_fills_defaults() {
        let task = Task::new("What is ownership?".to_string(), None, None);
        assert!(!task.task_id.is_nil());
        assert_eq!(task.source, "default");
        assert!(task.metadata.is_empty());

        let task = Task::new("q".to_string(), Some(String::new()), None);
        assert_eq!(task.source, "default");

        let task = Task::new("q".to_string(), Some("import".to_string()), None);
        assert_eq!(task.source, "import");
    }

    #[test]
    fn test_task_payload_roundtrip() {
        let mut metadata = HashMap::new();
        metadata.insert("batch".to_string(), serde_json::json!(7));
        let task = Task::new(
            "Explain borrowing.".to_string(),
            Some("crawler".to_string()),
            Some(metadata),
        );

        let payload = task.to_payload().unwrap();
        let parsed = Task::from_payload(&payload).unwrap();
        assert_eq!(parsed.task_id, task.task_id);
        assert_eq!(parsed.raw_questions, task.raw_questions);
        assert_eq!(parsed.source, "crawler");
        assert_eq!(parsed.metadata.get("batch"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let payload = serde_json::json!({"raw_questions": 42});
        assert!(Task::from_payload(&payload).is_err());
    }

    #[test]
    fn test_embeddable_texts() {
        let set = EnrichedQuestionSet {
            questions: vec![
                EnrichedQuestion {
                    original_question: "what is a mutex".to_string(),
                    detailed_question: "What is a mutex and when should one be used?".to_string(),
                    concise_answer: "A mutual-exclusion lock.".to_string(),
                    tags: vec!["concurrency".to_string()],
                },
                EnrichedQuestion {
                    original_question: "gc vs ownership".to_string(),
                    detailed_question: "How does ownership differ from garbage collection?"
                        .to_string(),
                    concise_answer: "Compile-time lifetime tracking.".to_string(),
                    tags: vec![],
                },
            ],
        };

        let texts = set.embeddable_texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(
            texts[0],
            "What is a mutex and when should one be used?\n\nA mutual-exclusion lock."
        );
        assert!(texts[1].contains("\n\n"));
    }

    #[test]
    fn test_new_article_from_question() {
        let q = EnrichedQuestion {
            original_question: "orig".to_string(),
            detailed_question: "detail".to_string(),
            concise_answer: "answer".to_string(),
            tags: vec!["t1".to_string()],
        };
        let article = NewArticle::from_question(&q, Vector::from(vec![1.0, 0.0]));
        assert_eq!(article.original_question, "orig");
        assert_eq!(article.detailed_question.as_deref(), Some("detail"));
        assert_eq!(article.concise_answer.as_deref(), Some("answer"));
        assert_eq!(article.tags, vec!["t1".to_string()]);
    }

    #[test]
    fn test_dedup_outcome_article_id() {
        let id = new_v7();
        assert_eq!(DedupOutcome::Inserted { article_id: id }.article_id(), id);
        assert_eq!(DedupOutcome::Merged { article_id: id }.article_id(), id);
    }

    #[test]
    fn test_new_v7_is_time_ordered() {
        let a = new_v7();
        let b = new_v7();
        assert!(a <= b);
    }
}
