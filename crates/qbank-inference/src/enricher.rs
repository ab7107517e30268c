//! Question enrichment over a generation backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use qbank_core::{EnrichedQuestionSet, EnrichmentBackend, Error, GenerationBackend, Result};

use crate::prompt::PromptTemplate;

/// Enriches raw question blobs into structured question sets.
///
/// Renders the prompt template, calls the generation backend, and parses
/// the model's JSON reply. Models frequently wrap JSON in markdown code
/// fences even when told not to, so fences are stripped before parsing.
pub struct QuestionEnricher {
    backend: Arc<dyn GenerationBackend>,
    template: PromptTemplate,
}

impl QuestionEnricher {
    /// Create an enricher with the built-in prompt template.
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            template: PromptTemplate::default(),
        }
    }

    /// Use a custom prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }
}

/// Strip a surrounding markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "jsonc", ...) on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl EnrichmentBackend for QuestionEnricher {
    async fn enrich(&self, raw_questions: &str) -> Result<EnrichedQuestionSet> {
        let prompt = self.template.render(raw_questions);
        let response = self.backend.generate(&prompt).await?;

        let text = strip_code_fence(&response);
        if text.is_empty() {
            return Err(Error::Enrichment("Model returned empty response".into()));
        }

        let set: EnrichedQuestionSet = serde_json::from_str(text).map_err(|e| {
            warn!(
                subsystem = "inference",
                component = "enricher",
                op = "enrich",
                response_len = response.len(),
                "Model response is not valid question-set JSON"
            );
            Error::Enrichment(format!("Failed to parse model response: {}", e))
        })?;

        if set.is_empty() {
            return Err(Error::Enrichment(
                "Model returned no questions for the input".into(),
            ));
        }

        debug!(
            subsystem = "inference",
            component = "enricher",
            op = "enrich",
            question_count = set.len(),
            model = self.backend.model_name(),
            "Enrichment complete"
        );
        Ok(set)
    }
}
