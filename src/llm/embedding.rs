//! Sentence embedding backends
//!
//! `encode(texts) -> [N, D]` with D fixed per model. Remote backends talk to
//! Ollama or an OpenAI-compatible `/embeddings` endpoint; the hashing
//! backend is a deterministic offline encoder.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::LlmError;
use super::rag::l2_normalize;
use crate::config::{EmbeddingBackend, EmbeddingConfig, Secret};
use crate::error::{PipelineError, Result};

/// Text encoder
#[async_trait]
pub trait EmbeddingModel: Send + Sync + Debug {
    /// Model name
    fn name(&self) -> &str;

    /// Encode a batch; one vector per input, in input order
    async fn encode(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError>;
}

/// Build the configured encoder
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let model: Arc<dyn EmbeddingModel> = match config.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbedder::new(config)?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.dim)),
    };
    debug!("Embedding backend {:?} with model {}", config.backend, model.name());
    Ok(model)
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::ConfigInvalid(format!("failed to create HTTP client: {}", e)))
}

/// Ollama `/api/embed`
#[derive(Debug)]
pub struct OllamaEmbedder {
    url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            url: format!("{}/api/embed", config.base_url()),
            model: config.model.clone(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(LlmError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        check_count(texts.len(), body.embeddings.len())?;
        Ok(body.embeddings)
    }
}

/// OpenAI-compatible `/embeddings`
#[derive(Debug)]
pub struct OpenAiEmbedder {
    url: String,
    model: String,
    api_key: Secret,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::ConfigInvalid("openai embedding backend needs AUTHRAG_EMBED_API_KEY".to_string())
        })?;
        Ok(Self {
            url: format!("{}/embeddings", config.base_url()),
            model: config.model.clone(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let request = OpenAiEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LlmError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: OpenAiEmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        check_count(texts.len(), body.data.len())?;
        let mut embeddings: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for item in body.data {
            let slot = embeddings
                .get_mut(item.index)
                .ok_or_else(|| LlmError::InvalidResponse(format!("embedding index {} out of range", item.index)))?;
            *slot = item.embedding;
        }
        Ok(embeddings)
    }
}

fn check_count(expected: usize, got: usize) -> std::result::Result<(), LlmError> {
    if expected != got {
        return Err(LlmError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected, got
        )));
    }
    Ok(())
}

/// Offline feature-hashing encoder
///
/// Lowercased word tokens are hashed (FNV-1a) into `dim` signed buckets and
/// the result is L2-normalised. Texts sharing vocabulary land close together,
/// which is enough for the small pattern corpus and for tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn encode(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_shape_and_determinism() {
        let model = HashingEmbedder::new(64);
        let texts = vec!["failed login from 10.0.0.1".to_string(), String::new()];
        let first = model.encode(&texts).await.unwrap();
        let second = model.encode(&texts).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|v| v.len() == 64));
        assert_eq!(first, second);
        assert!((cosine(&first[0], &first[0]) - 1.0).abs() < 1e-5);
        assert!(first[1].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_similarity() {
        let model = HashingEmbedder::new(256);
        let a = model.embed_one("brute force password attempts");
        let b = model.embed_one("Brute-force password attempts on one account");
        let c = model.embed_one("download of sensitive files after hours");
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn test_create_embedder() {
        let mut config = EmbeddingConfig {
            backend: EmbeddingBackend::Hashing,
            dim: 32,
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_embedder(&config).unwrap().name(), "hashing");

        config.backend = EmbeddingBackend::Ollama;
        assert_eq!(create_embedder(&config).unwrap().name(), "all-minilm");

        config.backend = EmbeddingBackend::OpenAi;
        assert!(matches!(create_embedder(&config), Err(PipelineError::ConfigInvalid(_))));
    }

    #[test]
    fn test_count_mismatch() {
        assert!(check_count(2, 2).is_ok());
        assert!(matches!(check_count(2, 1), Err(LlmError::InvalidResponse(_))));
    }
}
