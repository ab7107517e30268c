//! HTTP handlers for task submission and article queries.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::error;
use uuid::Uuid;

use qbank_core::{
    defaults, Article, ArticleRepository, EmbeddingBackend, EnrichedQuestion, QueueRepository,
    SubmitRequest, TaskStatus,
};
use qbank_db::Database;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub embedding: Arc<dyn EmbeddingBackend>,
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Internal(qbank_core::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<qbank_core::Error> for ApiError {
    fn from(err: qbank_core::Error) -> Self {
        match &err {
            qbank_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            qbank_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

// =============================================================================
// TASKS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub raw_questions: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: Uuid,
}

/// `POST /api/tasks` — submit a batch of raw questions for processing.
pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = qbank_jobs::submit(
        &state.db.queue,
        SubmitRequest {
            raw_questions: body.raw_questions,
            source: body.source,
            metadata: body.metadata,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse { task_id }),
    ))
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub retries: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /api/tasks/:id` — inspect a submitted task's queue state.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .db
        .queue
        .get(task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;

    Ok(Json(TaskStatusResponse {
        task_id: entry.id,
        task_type: entry.task_type,
        status: entry.status,
        retries: entry.retries,
        last_error: entry.last_error,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }))
}

// =============================================================================
// ARTICLES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    pub id: Uuid,
    pub original_question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concise_answer: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Merged duplicate questions; only populated on detail responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Vec<EnrichedQuestion>>,
}

impl ArticleResponse {
    fn summary(article: Article) -> Self {
        Self {
            id: article.id,
            original_question: article.original_question,
            detailed_question: article.detailed_question,
            concise_answer: article.concise_answer,
            tags: article.tags,
            created_at: article.created_at,
            similarity: None,
            ext: None,
        }
    }

    fn detail(article: Article) -> Self {
        let ext = article.ext.clone();
        Self {
            ext: Some(ext),
            ..Self::summary(article)
        }
    }

    fn scored(article: Article, distance: f64) -> Self {
        // Inner-product distance is a negated dot product; flip the sign
        // so clients see cosine similarity.
        Self {
            similarity: Some(-distance),
            ..Self::summary(article)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListArticlesParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Comma-separated tag filter; an article must carry every listed tag.
    pub tags: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ListArticlesResponse {
    pub data: Vec<ArticleResponse>,
    pub pagination: Pagination,
}

/// `GET /api/articles` — tag-filtered, paginated article listing.
pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ListArticlesParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(defaults::PAGE_LIMIT)
        .clamp(1, defaults::PAGE_LIMIT_MAX);
    let offset = (page - 1) * page_size;

    let tags: Vec<String> = params
        .tags
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    let (articles, total) = state.db.articles.list(&tags, page_size, offset).await?;

    Ok(Json(ListArticlesResponse {
        data: articles.into_iter().map(ArticleResponse::summary).collect(),
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages: (total + page_size - 1) / page_size,
        },
    }))
}

/// `GET /api/articles/:id` — single article including merged duplicates.
pub async fn get_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state
        .db
        .articles
        .get(article_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article {} not found", article_id)))?;

    Ok(Json(ArticleResponse::detail(article)))
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub limit: Option<i64>,
}

/// `GET /api/articles/:id/similar` — nearest neighbors of a stored article.
pub async fn similar_articles(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Query(params): Query<SimilarParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(10);
    if !(1..=defaults::PAGE_LIMIT_MAX).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            defaults::PAGE_LIMIT_MAX
        )));
    }

    let results = state.db.articles.similar_to(article_id, limit).await?;

    Ok(Json(serde_json::json!({
        "source_id": article_id,
        "data": results
            .into_iter()
            .map(|(article, distance)| ArticleResponse::scored(article, distance))
            .collect::<Vec<_>>(),
    })))
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
}

/// `POST /api/search` — embed the query text and rank articles by
/// inner-product similarity.
pub async fn search_articles(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }
    let limit = body.limit.unwrap_or(10);
    if !(1..=defaults::PAGE_LIMIT_MAX).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            defaults::PAGE_LIMIT_MAX
        )));
    }

    let mut vectors = state.embedding.embed_batch(&[body.query.clone()]).await?;
    let vector = vectors
        .pop()
        .ok_or_else(|| ApiError::Internal(qbank_core::Error::Embedding(
            "Embedding backend returned no vector for the query".into(),
        )))?;

    let results = state.db.articles.search_similar(&vector, limit).await?;

    Ok(Json(serde_json::json!({
        "query": body.query,
        "data": results
            .into_iter()
            .map(|(article, distance)| ArticleResponse::scored(article, distance))
            .collect::<Vec<_>>(),
    })))
}

// =============================================================================
// TAGS & HEALTH
// =============================================================================

/// `GET /api/tags` — all distinct tags across stored articles.
pub async fn list_tags(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tags = state.db.articles.all_tags().await?;
    Ok(Json(serde_json::json!({ "data": tags })))
}

/// `GET /api/health` — database reachability and queue depth.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    sqlx::query("SELECT 1")
        .execute(state.db.pool())
        .await
        .map_err(qbank_core::Error::Database)?;

    let stats = state.db.queue.stats().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "queue": stats,
    })))
}
