//! LLM Prompt Templates
//!
//! The prompt is a versioned contract: a fixed template with enumerated
//! output keys. Any model that honors the contract can sit behind the
//! classifier.

pub mod classification;

pub use classification::{ClassificationPrompt, PROMPT_VERSION};

use crate::types::{EventSummary, Passage};

/// Base prompt template
pub trait PromptTemplate {
    /// Get the system prompt
    fn system_prompt(&self) -> &str;

    /// Build the user prompt with context
    fn build_prompt(&self, context: &PromptContext<'_>) -> String;
}

/// Context for prompt building
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Event under classification
    pub event: &'a EventSummary,
    /// Retrieved passages, most relevant first
    pub passages: &'a [Passage],
}

impl<'a> PromptContext<'a> {
    pub fn new(event: &'a EventSummary, passages: &'a [Passage]) -> Self {
        Self { event, passages }
    }

    /// Passages as `[passage_id] content`, separated by blank lines
    pub fn format_passages(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[{}] {}", p.passage_id, p.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Event as compact JSON
    pub fn format_event(&self) -> String {
        serde_json::to_string(self.event).unwrap_or_else(|_| "{}".to_string())
    }
}
