//! LLM Provider Abstraction
//!
//! Completion backends implement [`LlmProvider`]; the classifier only ever
//! sees the trait, so tests substitute scripted providers.

pub mod openai;

pub use openai::OpenAiProvider;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM transport errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
    /// Request timeout
    #[error("Request timeout after {0}s")]
    Timeout(u64),
    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Response body did not match the endpoint contract
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Connection(err.to_string())
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Internal(err.to_string())
        }
    }
}

/// Completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Temperature
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,
    /// Model used
    pub model: String,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response time in milliseconds
    pub duration_ms: u64,
}

/// Provider health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Provider is available
    pub available: bool,
    pub provider: String,
    pub model: Option<String>,
    /// Response time (ms)
    pub latency_ms: Option<u64>,
    /// Error message if unavailable
    pub error: Option<String>,
}

/// LLM Provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Get provider name
    fn name(&self) -> &str;

    /// Check if provider is reachable
    async fn health_check(&self) -> Result<ProviderHealth, LlmError>;

    /// Generate completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
