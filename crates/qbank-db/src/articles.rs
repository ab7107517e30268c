//! Article repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use qbank_core::{
    new_v7, Article, ArticleRepository, EnrichedQuestion, Error, NewArticle, Result,
};

/// PostgreSQL implementation of [`ArticleRepository`].
///
/// Nearest-neighbor queries order by `embedding <#> $1` (inner product);
/// stored embeddings are unit-length, so that ordering is equivalent to
/// cosine ordering and is served by the HNSW `vector_ip_ops` index.
pub struct PgArticleRepository {
    pool: Pool<Postgres>,
}

impl PgArticleRepository {
    /// Create a new PgArticleRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    const ARTICLE_COLUMNS: &'static str =
        "id, original_question, detailed_question, concise_answer, tags, embedding, ext, created_at";

    /// Parse an article row into an Article.
    fn parse_article_row(row: &sqlx::postgres::PgRow) -> Result<Article> {
        let ext: serde_json::Value = row.get("ext");
        let ext: Vec<EnrichedQuestion> = serde_json::from_value(ext)
            .map_err(|e| Error::Serialization(format!("Invalid ext payload: {}", e)))?;

        Ok(Article {
            id: row.get("id"),
            original_question: row.get("original_question"),
            detailed_question: row.get("detailed_question"),
            concise_answer: row.get("concise_answer"),
            tags: row.get("tags"),
            embedding: row.get("embedding"),
            ext,
            created_at: row.get("created_at"),
        })
    }

    /// Parse a row carrying article columns plus a `distance` column.
    fn parse_scored_row(row: &sqlx::postgres::PgRow) -> Result<(Article, f64)> {
        let distance: f64 = row.get("distance");
        Ok((Self::parse_article_row(row)?, distance))
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn insert(&self, article: NewArticle) -> Result<Uuid> {
        let article_id = new_v7();

        sqlx::query(
            "INSERT INTO article
                 (id, original_question, detailed_question, concise_answer, tags, embedding, ext, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, '[]'::jsonb, $7)",
        )
        .bind(article_id)
        .bind(&article.original_question)
        .bind(&article.detailed_question)
        .bind(&article.concise_answer)
        .bind(&article.tags)
        .bind(&article.embedding)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(article_id)
    }

    async fn find_closest(&self, vector: &Vector) -> Result<Option<(Article, f64)>> {
        let query = format!(
            "SELECT {}, embedding <#> $1 AS distance
             FROM article
             ORDER BY embedding <#> $1
             LIMIT 1",
            Self::ARTICLE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(vector)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_scored_row).transpose()
    }

    async fn append_ext(&self, article_id: Uuid, question: &EnrichedQuestion) -> Result<()> {
        let question_json = serde_json::to_value(question)?;

        // COALESCE guards legacy rows where ext may be NULL.
        let result = sqlx::query(
            "UPDATE article
             SET ext = COALESCE(ext, '[]'::jsonb) || $2::jsonb
             WHERE id = $1",
        )
        .bind(article_id)
        .bind(&question_json)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Article {}", article_id)));
        }
        Ok(())
    }

    async fn get(&self, article_id: Uuid) -> Result<Option<Article>> {
        let query = format!("SELECT {} FROM article WHERE id = $1", Self::ARTICLE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_article_row).transpose()
    }

    async fn list(
        &self,
        tags: &[String],
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Article>, i64)> {
        // Empty tag filter means no filter; tags @> $1 is the GIN-indexed
        // array-containment query.
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM article
             WHERE cardinality($1::text[]) = 0 OR tags @> $1",
        )
        .bind(tags)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let query = format!(
            "SELECT {} FROM article
             WHERE cardinality($1::text[]) = 0 OR tags @> $1
             ORDER BY id DESC
             LIMIT $2 OFFSET $3",
            Self::ARTICLE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(tags)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let articles = rows
            .iter()
            .map(Self::parse_article_row)
            .collect::<Result<Vec<_>>>()?;

        Ok((articles, total))
    }

    async fn search_similar(&self, vector: &Vector, limit: i64) -> Result<Vec<(Article, f64)>> {
        let query = format!(
            "SELECT {}, embedding <#> $1 AS distance
             FROM article
             ORDER BY embedding <#> $1
             LIMIT $2",
            Self::ARTICLE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(vector)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_scored_row).collect()
    }

    async fn similar_to(&self, article_id: Uuid, limit: i64) -> Result<Vec<(Article, f64)>> {
        let source = self
            .get(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;

        let query = format!(
            "SELECT {}, embedding <#> $1 AS distance
             FROM article
             WHERE id != $2
             ORDER BY embedding <#> $1
             LIMIT $3",
            Self::ARTICLE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(&source.embedding)
            .bind(article_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_scored_row).collect()
    }

    async fn all_tags(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT unnest(tags) AS tag FROM article ORDER BY tag",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows)
    }
}
