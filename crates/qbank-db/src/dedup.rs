//! Similarity-keyed deduplication of enriched questions.
//!
//! Each produced (question, embedding) pair is resolved against the article
//! store: if the nearest stored article is closer than the merge threshold,
//! the question is appended to that article's `ext` list; otherwise a new
//! article is inserted. Semantically identical questions collapse to one
//! article while every original phrasing is retained for provenance.

use std::sync::Arc;

use pgvector::Vector;
use tracing::{debug, info};

use qbank_core::{
    defaults, ArticleRepository, DedupOutcome, EnrichedQuestion, NewArticle, Result,
};

/// Merge-vs-insert decision engine over an [`ArticleRepository`].
pub struct DedupEngine {
    articles: Arc<dyn ArticleRepository>,
    threshold: f64,
}

impl DedupEngine {
    /// Create an engine with the default merge threshold.
    pub fn new(articles: Arc<dyn ArticleRepository>) -> Self {
        Self::with_threshold(articles, defaults::MERGE_THRESHOLD)
    }

    /// Create an engine with a custom merge threshold.
    ///
    /// The threshold is an inner-product distance and therefore negative;
    /// values closer to -1.0 require near-identical questions to merge.
    pub fn with_threshold(articles: Arc<dyn ArticleRepository>, threshold: f64) -> Self {
        Self {
            articles,
            threshold,
        }
    }

    /// Resolve one enriched question against the store.
    ///
    /// The find-then-write window is not transactional: two concurrent
    /// near-duplicates can both miss each other's insert and produce two
    /// articles. Accepted narrow race; the queue retries never replay a
    /// completed merge.
    pub async fn process(
        &self,
        question: &EnrichedQuestion,
        vector: Vector,
    ) -> Result<DedupOutcome> {
        let closest = self.articles.find_closest(&vector).await?;

        if let Some((article, distance)) = closest {
            if distance < self.threshold {
                info!(
                    subsystem = "db",
                    component = "dedup",
                    op = "process",
                    article_id = %article.id,
                    distance,
                    "Duplicate detected, merging into existing article"
                );
                self.articles.append_ext(article.id, question).await?;
                return Ok(DedupOutcome::Merged {
                    article_id: article.id,
                });
            }

            debug!(
                subsystem = "db",
                component = "dedup",
                op = "process",
                nearest_id = %article.id,
                distance,
                threshold = self.threshold,
                "Nearest article above threshold, inserting new article"
            );
        } else {
            debug!(
                subsystem = "db",
                component = "dedup",
                op = "process",
                "Store is empty, inserting first article"
            );
        }

        let article_id = self
            .articles
            .insert(NewArticle::from_question(question, vector))
            .await?;

        Ok(DedupOutcome::Inserted { article_id })
    }
}
