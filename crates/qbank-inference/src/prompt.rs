//! Enrichment prompt template.

use qbank_core::{Error, Result};

/// Placeholder substituted with the raw question blob.
pub const INPUT_PLACEHOLDER: &str = "{input_text}";

/// Built-in enrichment prompt.
///
/// Instructs the model to split a raw blob of interview questions into
/// structured entries and answer strictly in JSON so the response can be
/// deserialized into an `EnrichedQuestionSet`.
pub const DEFAULT_ENRICH_TEMPLATE: &str = r#"You are an expert technical interviewer curating a knowledge base.

The text below contains one or more raw interview questions, possibly
informal, abbreviated, or mixed together. For each distinct question:

1. Keep the original wording as `original_question`.
2. Write a `detailed_question`: a complete, self-contained rephrasing that
   an interviewer could ask verbatim.
3. Write a `concise_answer`: a correct answer in at most a few sentences.
4. Assign `tags`: 1-5 lowercase topic labels.

Respond with ONLY a JSON object of this exact shape, no commentary:

{"questions": [{"original_question": "...", "detailed_question": "...", "concise_answer": "...", "tags": ["..."]}]}

Raw questions:

{input_text}
"#;

/// A prompt template with a single `{input_text}` placeholder.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_ENRICH_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Create a template from a raw string containing the placeholder.
    pub fn new(template: String) -> Result<Self> {
        if !template.contains(INPUT_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "Prompt template is missing the {} placeholder",
                INPUT_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// Load a template from a file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::new(content)
    }

    /// Substitute the raw input into the template.
    pub fn render(&self, input_text: &str) -> String {
        self.template.replace(INPUT_PLACEHOLDER, input_text)
    }
}
