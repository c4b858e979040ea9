//! OpenAI-compatible chat completion provider
//!
//! Speaks the `/chat/completions` dialect shared by OpenAI, Groq and most
//! hosted inference gateways.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderHealth};
use crate::config::{LlmConfig, Secret};

/// OpenAI-compatible provider
#[derive(Debug)]
pub struct OpenAiProvider {
    config: LlmConfig,
    client: Client,
    api_key: Secret,
}

impl OpenAiProvider {
    /// Create a provider; fails without an API key
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Authentication("no API key configured".to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url.trim_end_matches('/'))
    }

    fn chat_request(&self, request: CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<ProviderHealth, LlmError> {
        let start = Instant::now();

        let response = self
            .client
            .get(self.models_url())
            .bearer_auth(self.api_key.expose())
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let latency_ms = Some(start.elapsed().as_millis() as u64);
        let health = match response {
            Ok(resp) if resp.status().is_success() => ProviderHealth {
                available: true,
                provider: self.name().to_string(),
                model: Some(self.config.model.clone()),
                latency_ms,
                error: None,
            },
            Ok(resp) => ProviderHealth {
                available: false,
                provider: self.name().to_string(),
                model: None,
                latency_ms,
                error: Some(if resp.status().as_u16() == 401 {
                    "Invalid API key".to_string()
                } else {
                    format!("HTTP {}", resp.status())
                }),
            },
            Err(e) => ProviderHealth {
                available: false,
                provider: self.name().to_string(),
                model: None,
                latency_ms,
                error: Some(e.to_string()),
            },
        };
        Ok(health)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();
        let body = self.chat_request(request);

        debug!("Sending chat completion request: model={}", self.config.model);

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| match LlmError::from(e) {
                LlmError::Timeout(_) => LlmError::Timeout(self.config.timeout_secs),
                other => other,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            warn!("Completion endpoint returned HTTP {}", status.as_u16());
            return Err(status_error(status, &text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            text: choice.message.content,
            model: chat.model.unwrap_or_else(|| self.config.model.clone()),
            finish_reason: choice.finish_reason,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Error for a completion response other than `200 OK`
fn status_error(status: StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Authentication(format!("HTTP {}", status.as_u16())),
        429 => LlmError::RateLimited("Rate limit exceeded".to_string()),
        code => LlmError::Http {
            status: code,
            body: body.chars().take(200).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> LlmConfig {
        LlmConfig {
            base_url: "http://llm.local/v1/".to_string(),
            api_key: Some(Secret::new("sk-test")),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_non_ok_status_is_transport_error() {
        assert!(matches!(
            status_error(StatusCode::NO_CONTENT, ""),
            LlmError::Http { status: 204, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::CREATED, "created"),
            LlmError::Http { status: 201, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            LlmError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited(_)
        ));
        let long = "x".repeat(500);
        match status_error(StatusCode::INTERNAL_SERVER_ERROR, &long) {
            LlmError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiProvider::new(LlmConfig::default()).unwrap_err();
        assert!(matches!(err, LlmError::Authentication(_)));
    }

    #[test]
    fn test_urls() {
        let provider = OpenAiProvider::new(config_with_key()).unwrap();
        assert_eq!(provider.chat_url(), "http://llm.local/v1/chat/completions");
        assert_eq!(provider.models_url(), "http://llm.local/v1/models");
    }

    #[test]
    fn test_key_not_in_debug() {
        let provider = OpenAiProvider::new(config_with_key()).unwrap();
        assert!(!format!("{:?}", provider).contains("sk-test"));
    }

    #[test]
    fn test_chat_request_body() {
        let provider = OpenAiProvider::new(config_with_key()).unwrap();
        let body = provider.chat_request(CompletionRequest::new("classify this").with_system("analyst"));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "classify this");
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_response_contract() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"label\":\"normal\"}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, r#"{"label":"normal"}"#);
        assert!(parsed.model.is_none());
    }
}
