//! authrag: retrieval-augmented classification of authentication events
//!
//! Raw login logs are normalized into fixed-shape event summaries, a small
//! labeled corpus of attack patterns is embedded into a flat vector index,
//! and each event is classified by an LLM prompted with the passages most
//! relevant to it. Every stage is a separate binary under `src/bin/`.

pub mod config;
pub mod corpus;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use types::{EventSummary, FeatureVector, Label, Passage, RecentEvent, RecordId, Verdict};
