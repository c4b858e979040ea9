//! Event Classification Prompt
//!
//! Asks the model to pick one label from the closed set, grounded only in
//! the retrieved passages, and to answer with a single JSON object.

use super::{PromptContext, PromptTemplate};
use crate::types::{Label, MAX_INDICATORS};

/// Bumped whenever the template or its output keys change
pub const PROMPT_VERSION: &str = "v1";

/// Classification prompt template
pub struct ClassificationPrompt {
    system: String,
}

impl ClassificationPrompt {
    pub fn new() -> Self {
        Self {
            system: CLASSIFY_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for ClassificationPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplate for ClassificationPrompt {
    fn system_prompt(&self) -> &str {
        &self.system
    }

    fn build_prompt(&self, context: &PromptContext<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "Security classification task: authentication event triage (prompt {}).\n\n",
            PROMPT_VERSION
        ));

        prompt.push_str("Retrieved passages (RAG):\n");
        prompt.push_str(&context.format_passages());
        prompt.push_str("\n\n");

        prompt.push_str("Event (event_summary):\n");
        prompt.push_str(&context.format_event());
        prompt.push_str("\n\n");

        prompt.push_str(
            "Instruction: using ONLY the passages above and the event_summary, choose the alert type among:\n",
        );
        prompt.push_str(&Label::joined());
        prompt.push_str("\n\n");

        prompt.push_str("Answer with EXACTLY one valid JSON object of this form:\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"label\": \"<one of the labels above>\",\n");
        prompt.push_str("  \"score\": <number between 0.0 and 1.0>,\n");
        prompt.push_str("  \"top_indicators\": [\"short indicator 1\", \"short indicator 2\"]\n");
        prompt.push_str("}\n\n");

        prompt.push_str("Constraints:\n");
        prompt.push_str("1. `label` must be exactly one of the listed labels.\n");
        prompt.push_str("2. `score` is a confidence (0.0 low, 1.0 high).\n");
        prompt.push_str(&format!(
            "3. `top_indicators` holds at most {} short cues taken from the passages or the event_summary.\n",
            MAX_INDICATORS
        ));
        prompt.push_str("4. Do NOT output any other key, and no text outside the JSON object.\n");
        prompt.push_str(
            "5. If the passages are insufficient, answer {\"label\": \"normal\", \"score\": 0.0, \"top_indicators\": []}.\n",
        );

        prompt
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = "You are a security analyst classifying authentication events. \
You answer only with a single JSON object and never add commentary.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventSummary, FeatureVector, Passage, RecentEvent, RecordId};

    fn event() -> EventSummary {
        EventSummary {
            id: Some(RecordId::Int(42)),
            user_id: Some(RecordId::Text("alice".to_string())),
            recent_events: vec![RecentEvent {
                timestamp: "2025-10-14T10:00:00Z".to_string(),
                outcome: Some("failed".to_string()),
                ip: Some("10.0.0.1".to_string()),
                device: None,
            }],
            features: FeatureVector::default(),
            label: "unknown".to_string(),
        }
    }

    fn passages() -> Vec<Passage> {
        vec![
            Passage {
                passage_id: "brute_force_p01".to_string(),
                doc_id: "brute_force_doc".to_string(),
                content: "Repeated password attempts.".to_string(),
                tags: vec![Label::BruteForce],
            },
            Passage {
                passage_id: "normal_p02".to_string(),
                doc_id: "normal_doc".to_string(),
                content: "Known device.".to_string(),
                tags: vec![Label::Normal],
            },
        ]
    }

    #[test]
    fn test_sections_in_order() {
        let event = event();
        let passages = passages();
        let prompt = ClassificationPrompt::new().build_prompt(&PromptContext::new(&event, &passages));

        let header = prompt.find("Security classification task").unwrap();
        let first = prompt.find("[brute_force_p01] Repeated password attempts.").unwrap();
        let second = prompt.find("[normal_p02] Known device.").unwrap();
        let event_json = prompt.find("{\"id\":42,").unwrap();
        let labels = prompt.find(&Label::joined()).unwrap();
        let schema = prompt.find("\"top_indicators\": [\"short indicator 1\"").unwrap();
        let fallback = prompt.find("If the passages are insufficient").unwrap();

        assert!(header < first && first < second);
        assert!(second < event_json && event_json < labels);
        assert!(labels < schema && schema < fallback);
        assert!(prompt.contains("[brute_force_p01] Repeated password attempts.\n\n[normal_p02]"));
    }

    #[test]
    fn test_empty_passages_still_renders() {
        let event = event();
        let prompt = ClassificationPrompt::default().build_prompt(&PromptContext::new(&event, &[]));
        assert!(prompt.contains("Retrieved passages (RAG):\n\n"));
        assert!(prompt.contains("\"label\": \"normal\", \"score\": 0.0"));
    }

    #[test]
    fn test_defaults() {
        let template = ClassificationPrompt::new();
        assert!(template.system_prompt().contains("JSON"));
        let event = event();
        let prompt = template.build_prompt(&PromptContext::new(&event, &[]));
        assert!(prompt.starts_with(&format!("Security classification task: authentication event triage (prompt {})", PROMPT_VERSION)));
    }
}
