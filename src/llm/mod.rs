//! LLM Integration Module
//!
//! Retrieval-augmented classification of authentication events:
//! - Sentence embeddings of the attack-pattern corpus
//! - Flat vector index and dense / lexical passage retrieval
//! - Schema-bound classification prompt
//! - Completion provider abstraction with strict verdict parsing
//! - Optional deterministic rule overlay
//!
//! # Example
//!
//! ```ignore
//! use authrag::llm::{Classifier, OpenAiProvider, Retriever};
//!
//! let retriever = Arc::new(Retriever::lexical(passages, 5));
//! let provider = Arc::new(OpenAiProvider::new(config.llm.clone())?);
//! let classifier = Classifier::new(provider, retriever, &config.llm).with_rule_overlay(true);
//!
//! let result = classifier.classify(&summary).await;
//! println!("{} {:.2}", result.verdict.label, result.verdict.score);
//! ```
//!
//! # Providers
//!
//! Any OpenAI-compatible chat endpoint (Groq by default). Credentials come
//! from the environment only and never appear in logs.

pub mod classifier;
pub mod embedding;
pub mod prompts;
pub mod provider;
pub mod rag;
pub mod rules;

// Re-exports for convenience
pub use classifier::{
    parse_verdict, BatchOutcome, Classification, Classifier, ClassifierStats, FallbackReason, VerdictError,
};
pub use embedding::{create_embedder, EmbeddingModel, HashingEmbedder, OllamaEmbedder, OpenAiEmbedder};
pub use prompts::{ClassificationPrompt, PromptContext, PromptTemplate, PROMPT_VERSION};
pub use provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, OpenAiProvider, ProviderHealth};
pub use rag::{Metric, RetrievalError, Retriever, VectorStore};
pub use rules::{OverlayRule, HIGH_GEO_VELOCITY};
