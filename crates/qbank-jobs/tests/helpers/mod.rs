//! In-memory doubles and mock collaborators for pipeline/worker tests.
//!
//! `MemoryQueue` reproduces the store's claim semantics (atomic claims,
//! backoff gating, stuck reclaim) behind a single mutex so the scheduling
//! logic can be tested without PostgreSQL; the SQL-level behavior itself is
//! covered by the ignored integration suite in qbank-db.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use qbank_core::{
    new_v7, Article, ArticleRepository, EmbeddingBackend, EnrichedQuestion, EnrichedQuestionSet,
    EnrichmentBackend, Error, NewArticle, QueueEntry, QueueRepository, QueueStats, Result,
    TaskStatus, Vector,
};
use qbank_db::DedupEngine;
use qbank_jobs::TaskPipeline;

// ============================================================================
// QUEUE DOUBLE
// ============================================================================

/// In-memory queue with claim/backoff/reclaim semantics.
pub struct MemoryQueue {
    entries: Mutex<Vec<QueueEntry>>,
    backoff_base: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            backoff_base: Duration::from_secs(10),
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Shorten the backoff base so retry tests run in milliseconds.
    pub fn with_backoff_base(base: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            backoff_base: base,
        })
    }

    fn backoff(&self, retries: i32) -> chrono::Duration {
        let exp = retries.clamp(0, 30) as u32;
        chrono::Duration::from_std(self.backoff_base * 2u32.pow(exp))
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }

    /// Insert an entry in an arbitrary state (test setup shortcut).
    pub async fn push_entry(
        &self,
        status: TaskStatus,
        retries: i32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Uuid {
        let id = new_v7();
        self.entries.lock().await.push(QueueEntry {
            id,
            task_type: "enrich_questions".to_string(),
            payload: serde_json::json!({}),
            status,
            retries,
            last_error: None,
            created_at,
            updated_at,
        });
        id
    }

    /// Rewind an entry's update timestamp (to simulate elapsed backoff).
    pub async fn set_updated_at(&self, entry_id: Uuid, updated_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
            entry.updated_at = updated_at;
        }
    }

    pub async fn entry(&self, entry_id: Uuid) -> QueueEntry {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .expect("entry not found")
    }
}

#[async_trait]
impl QueueRepository for MemoryQueue {
    async fn enqueue(&self, task_type: &str, payload: JsonValue) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        self.entries.lock().await.push(QueueEntry {
            id,
            task_type: task_type.to_string(),
            payload,
            status: TaskStatus::Ready,
            retries: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn claim_ready(&self) -> Result<Option<QueueEntry>> {
        let mut entries = self.entries.lock().await;
        let claimed = entries
            .iter_mut()
            .filter(|e| e.status == TaskStatus::Ready)
            .min_by_key(|e| e.created_at);

        Ok(claimed.map(|entry| {
            entry.status = TaskStatus::Processing;
            entry.updated_at = Utc::now();
            entry.clone()
        }))
    }

    async fn claim_failed_for_retry(&self, max_retries: i32) -> Result<Option<QueueEntry>> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let claimed = entries
            .iter_mut()
            .filter(|e| {
                e.status == TaskStatus::Failed
                    && e.retries < max_retries
                    && now - e.updated_at >= self.backoff(e.retries)
            })
            .min_by_key(|e| e.updated_at);

        Ok(claimed.map(|entry| {
            entry.status = TaskStatus::Processing;
            entry.updated_at = now;
            entry.clone()
        }))
    }

    async fn mark_completed(&self, entry_id: Uuid) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
            if entry.status.can_transition_to(TaskStatus::Completed) {
                entry.status = TaskStatus::Completed;
                entry.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, entry_id: Uuid, error: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
            if entry.status.can_transition_to(TaskStatus::Failed) {
                entry.status = TaskStatus::Failed;
                entry.retries += 1;
                entry.last_error = Some(error.to_string());
                entry.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn reclaim_stuck(&self, timeout: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let mut entries = self.entries.lock().await;
        let mut reclaimed = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| e.status == TaskStatus::Processing && e.updated_at < cutoff)
        {
            entry.status = TaskStatus::Ready;
            entry.updated_at = Utc::now();
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<QueueEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.id == entry_id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let entries = self.entries.lock().await;
        let count = |status: TaskStatus| entries.iter().filter(|e| e.status == status).count() as i64;
        Ok(QueueStats {
            ready: count(TaskStatus::Ready),
            processing: count(TaskStatus::Processing),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            total: entries.len() as i64,
        })
    }
}

// ============================================================================
// ARTICLE DOUBLE
// ============================================================================

/// In-memory article store with brute-force inner-product search.
pub struct MemoryArticles {
    rows: Mutex<Vec<Article>>,
    inserts: AtomicUsize,
    /// When set, inserts beyond this count fail (mid-loop failure injection).
    fail_after_inserts: Option<usize>,
}

impl Default for MemoryArticles {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            inserts: AtomicUsize::new(0),
            fail_after_inserts: None,
        }
    }
}

impl MemoryArticles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store that fails every insert after the first `n`.
    pub fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after_inserts: Some(n),
            ..Self::default()
        })
    }

    pub async fn count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

fn ip_distance(a: &Vector, b: &Vector) -> f64 {
    -a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum::<f64>()
}

#[async_trait]
impl ArticleRepository for MemoryArticles {
    async fn insert(&self, article: NewArticle) -> Result<Uuid> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after_inserts {
            if n >= limit {
                return Err(Error::Internal("simulated store write failure".into()));
            }
        }

        let id = new_v7();
        self.rows.lock().await.push(Article {
            id,
            original_question: article.original_question,
            detailed_question: article.detailed_question,
            concise_answer: article.concise_answer,
            tags: article.tags,
            embedding: article.embedding,
            ext: Vec::new(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_closest(&self, vector: &Vector) -> Result<Option<(Article, f64)>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .map(|a| (a.clone(), ip_distance(&a.embedding, vector)))
            .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2)))
    }

    async fn append_ext(&self, article_id: Uuid, question: &EnrichedQuestion) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let article = rows
            .iter_mut()
            .find(|a| a.id == article_id)
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;
        article.ext.push(question.clone());
        Ok(())
    }

    async fn get(&self, article_id: Uuid) -> Result<Option<Article>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|a| a.id == article_id).cloned())
    }

    async fn list(
        &self,
        tags: &[String],
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Article>, i64)> {
        let rows = self.rows.lock().await;
        let filtered: Vec<Article> = rows
            .iter()
            .filter(|a| tags.iter().all(|t| a.tags.contains(t)))
            .cloned()
            .collect();
        let total = filtered.len() as i64;
        let page = filtered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn search_similar(&self, vector: &Vector, limit: i64) -> Result<Vec<(Article, f64)>> {
        let rows = self.rows.lock().await;
        let mut scored: Vec<_> = rows
            .iter()
            .map(|a| (a.clone(), ip_distance(&a.embedding, vector)))
            .collect();
        scored.sort_by(|(_, d1), (_, d2)| d1.total_cmp(d2));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn similar_to(&self, article_id: Uuid, limit: i64) -> Result<Vec<(Article, f64)>> {
        let source = self
            .get(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;
        let mut results = self.search_similar(&source.embedding, limit + 1).await?;
        results.retain(|(a, _)| a.id != article_id);
        results.truncate(limit as usize);
        Ok(results)
    }

    async fn all_tags(&self) -> Result<Vec<String>> {
        let rows = self.rows.lock().await;
        let mut tags: Vec<String> = rows.iter().flat_map(|a| a.tags.clone()).collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Tracks concurrent executions so ceiling tests can assert a maximum.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Enrichment stub producing one question per non-empty input line.
pub struct MockEnrichment {
    fail_times: AtomicUsize,
    latency: Option<Duration>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl MockEnrichment {
    /// Always succeeds, splitting the raw blob on newlines.
    pub fn splitting() -> Self {
        Self {
            fail_times: AtomicUsize::new(0),
            latency: None,
            gauge: None,
        }
    }

    /// Fails every call.
    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// Fails the first `n` calls, then succeeds.
    pub fn failing_times(n: usize) -> Self {
        Self {
            fail_times: AtomicUsize::new(n),
            latency: None,
            gauge: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }
}

#[async_trait]
impl EnrichmentBackend for MockEnrichment {
    async fn enrich(&self, raw_questions: &str) -> Result<EnrichedQuestionSet> {
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        let remaining = self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            return Err(Error::Enrichment("mock enrichment failure".into()));
        }

        let questions: Vec<EnrichedQuestion> = raw_questions
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| EnrichedQuestion {
                original_question: line.to_string(),
                detailed_question: format!("{} (detailed)", line),
                concise_answer: format!("Answer: {}", line),
                tags: vec!["mock".to_string()],
            })
            .collect();

        if questions.is_empty() {
            return Err(Error::Enrichment("no questions in input".into()));
        }
        Ok(EnrichedQuestionSet { questions })
    }
}

/// Unit basis vector `e_index` of the given dimension.
pub fn basis_vector(dimension: usize, index: usize) -> Vector {
    let mut values = vec![0.0; dimension];
    values[index % dimension] = 1.0;
    Vector::from(values)
}

enum EmbedMode {
    /// The i-th text of each batch gets basis vector `e_i` (mutually
    /// orthogonal, inner-product distance 0 between any pair).
    Orthogonal,
    /// Every text gets the same vector.
    Constant(Vec<f32>),
    /// Returns one vector fewer than requested (count-mismatch injection).
    ShortByOne,
    /// Fails every call.
    Failing,
}

/// Embedding stub with deterministic vectors.
pub struct MockEmbedding {
    mode: EmbedMode,
    dimension: usize,
}

impl MockEmbedding {
    pub fn orthogonal(dimension: usize) -> Self {
        Self {
            mode: EmbedMode::Orthogonal,
            dimension,
        }
    }

    pub fn constant(values: Vec<f32>) -> Self {
        Self {
            dimension: values.len(),
            mode: EmbedMode::Constant(values),
        }
    }

    pub fn short_by_one(dimension: usize) -> Self {
        Self {
            mode: EmbedMode::ShortByOne,
            dimension,
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            mode: EmbedMode::Failing,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        match &self.mode {
            EmbedMode::Orthogonal => Ok((0..texts.len())
                .map(|i| basis_vector(self.dimension, i))
                .collect()),
            EmbedMode::Constant(values) => Ok(texts
                .iter()
                .map(|_| Vector::from(values.clone()))
                .collect()),
            EmbedMode::ShortByOne => {
                let mut vectors: Vec<Vector> = (0..texts.len())
                    .map(|i| basis_vector(self.dimension, i))
                    .collect();
                vectors.pop();
                Ok(vectors)
            }
            EmbedMode::Failing => Err(Error::Embedding("mock embedding failure".into())),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Wire a pipeline over the in-memory doubles.
pub fn build_pipeline(
    queue: Arc<MemoryQueue>,
    articles: Arc<MemoryArticles>,
    enrichment: MockEnrichment,
    embedding: MockEmbedding,
) -> Arc<TaskPipeline> {
    Arc::new(TaskPipeline::new(
        queue,
        Arc::new(enrichment),
        Arc::new(embedding),
        DedupEngine::new(articles),
    ))
}

/// Poll until an entry reaches the expected status or the timeout elapses.
pub async fn wait_for_status(
    queue: &MemoryQueue,
    entry_id: Uuid,
    expected: TaskStatus,
    timeout: Duration,
) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if queue.entry(entry_id).await.status == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
