//! Pipeline configuration
//!
//! Every setting comes from an `AUTHRAG_*` environment variable with a
//! built-in default. Credentials are only ever read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::llm::rag::Metric;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub corpus: CorpusConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub classifier: ClassifierConfig,
}

/// Input and artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw log directory
    pub data_dir: PathBuf,
    /// Artifact directory
    pub prepared_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            prepared_dir: PathBuf::from("prepared"),
        }
    }
}

impl PathsConfig {
    pub fn corpus_path(&self) -> PathBuf {
        self.prepared_dir.join("corpus_passages.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.prepared_dir.join("faiss_index.bin")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.prepared_dir.join("faiss_meta.json")
    }

    pub fn summaries_path(&self) -> PathBuf {
        self.prepared_dir.join("event_summaries.json")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.prepared_dir.join("prompts")
    }

    pub fn verdicts_path(&self) -> PathBuf {
        self.prepared_dir.join("verdicts.json")
    }
}

/// Corpus generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Variants per label (M)
    pub passages_per_label: usize,
    /// Seed of the template sampler
    pub seed: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            passages_per_label: 12,
            seed: 42,
        }
    }
}

/// Embedding service backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embed`
    Ollama,
    /// OpenAI-compatible `/embeddings`
    OpenAi,
    /// Offline feature-hashing encoder
    Hashing,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self::Ollama
    }
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "hashing" => Ok(Self::Hashing),
            other => Err(format!("unknown embedding backend '{}'", other)),
        }
    }
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model name passed to the service
    pub model: String,
    /// Base URL override
    pub url: Option<String>,
    /// Dimension of the hashing encoder
    pub dim: usize,
    #[serde(skip)]
    pub api_key: Option<Secret>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "all-minilm".to_string(),
            url: None,
            dim: 384,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> String {
        match (&self.url, self.backend) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, EmbeddingBackend::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, _) => "http://127.0.0.1:11434".to_string(),
        }
    }
}

/// How passages are ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Nearest-neighbor search over the persisted index
    Dense,
    /// Token-overlap ranking with keyword expansion
    Lexical,
    /// Dense when the index is present, lexical otherwise
    Auto,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "lexical" => Ok(Self::Lexical),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown retrieval mode '{}'", other)),
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    /// Number of passages per query
    pub top_k: usize,
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Auto,
            top_k: 5,
            metric: Metric::InnerProduct,
        }
    }
}

/// Completion endpoint settings (OpenAI-compatible chat API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip)]
    pub api_key: Option<Secret>,
    /// Low temperature for consistent verdicts
    pub temperature: f32,
    pub max_tokens: usize,
    /// Per-call timeout
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 300,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// API key, or `ConfigInvalid` when none is configured
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose())
            .ok_or_else(|| {
                PipelineError::ConfigInvalid(
                    "no LLM API key (set AUTHRAG_LLM_API_KEY, GROQ_API_KEY or OPENAI_API_KEY)".to_string(),
                )
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Classification stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Let deterministic feature rules override the LLM
    pub rule_overlay: bool,
    /// Concurrent classification workers
    pub workers: usize,
    /// Optional batch deadline
    pub deadline_secs: Option<u64>,
    /// Prompts written by the prompt stage
    pub prompt_limit: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rule_overlay: false,
            workers: 4,
            deadline_secs: None,
            prompt_limit: 200,
        }
    }
}

/// String that never shows up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl PipelineConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = var("AUTHRAG_DATA_DIR") {
            config.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("AUTHRAG_PREPARED_DIR") {
            config.paths.prepared_dir = PathBuf::from(dir);
        }

        config.corpus.passages_per_label =
            parse(&var, "AUTHRAG_PASSAGES_PER_LABEL", config.corpus.passages_per_label)?;
        config.corpus.seed = parse(&var, "AUTHRAG_CORPUS_SEED", config.corpus.seed)?;

        config.embedding.backend = parse(&var, "AUTHRAG_EMBED_BACKEND", config.embedding.backend)?;
        if let Some(model) = var("AUTHRAG_EMBED_MODEL") {
            config.embedding.model = model;
        }
        config.embedding.url = var("AUTHRAG_EMBED_URL");
        config.embedding.dim = parse(&var, "AUTHRAG_EMBED_DIM", config.embedding.dim)?;

        config.retrieval.mode = parse(&var, "AUTHRAG_RETRIEVAL_MODE", config.retrieval.mode)?;
        config.retrieval.top_k = parse(&var, "AUTHRAG_TOP_K", config.retrieval.top_k)?;
        config.retrieval.metric = parse(&var, "AUTHRAG_METRIC", config.retrieval.metric)?;

        if let Some(url) = var("AUTHRAG_LLM_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("AUTHRAG_LLM_MODEL") {
            config.llm.model = model;
        }
        config.llm.api_key = var("AUTHRAG_LLM_API_KEY")
            .or_else(|| var("GROQ_API_KEY"))
            .or_else(|| var("OPENAI_API_KEY"))
            .map(Secret::new);
        config.llm.temperature = parse(&var, "AUTHRAG_LLM_TEMPERATURE", config.llm.temperature)?;
        config.llm.max_tokens = parse(&var, "AUTHRAG_LLM_MAX_TOKENS", config.llm.max_tokens)?;
        config.llm.timeout_secs = parse(&var, "AUTHRAG_LLM_TIMEOUT_SECS", config.llm.timeout_secs)?;

        config.embedding.api_key = var("AUTHRAG_EMBED_API_KEY").map(Secret::new);

        config.classifier.rule_overlay = parse_flag(&var, "AUTHRAG_RULE_OVERLAY", config.classifier.rule_overlay)?;
        config.classifier.workers = parse(&var, "AUTHRAG_WORKERS", config.classifier.workers)?;
        config.classifier.deadline_secs = match var("AUTHRAG_DEADLINE_SECS") {
            Some(_) => Some(parse(&var, "AUTHRAG_DEADLINE_SECS", 0u64)?),
            None => None,
        };
        config.classifier.prompt_limit = parse(&var, "AUTHRAG_PROMPT_LIMIT", config.classifier.prompt_limit)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings outside their allowed range
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(PipelineError::ConfigInvalid("AUTHRAG_TOP_K must be at least 1".to_string()));
        }
        if self.classifier.workers == 0 {
            return Err(PipelineError::ConfigInvalid("AUTHRAG_WORKERS must be at least 1".to_string()));
        }
        if !(0.0..=0.1).contains(&self.llm.temperature) {
            return Err(PipelineError::ConfigInvalid(format!(
                "AUTHRAG_LLM_TEMPERATURE must be within [0, 0.1], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(PipelineError::ConfigInvalid("AUTHRAG_LLM_TIMEOUT_SECS must be at least 1".to_string()));
        }
        if self.embedding.backend == EmbeddingBackend::OpenAi && self.embedding.api_key.is_none() {
            return Err(PipelineError::ConfigInvalid(
                "AUTHRAG_EMBED_BACKEND=openai requires AUTHRAG_EMBED_API_KEY".to_string(),
            ));
        }
        if self.embedding.dim == 0 {
            return Err(PipelineError::ConfigInvalid("AUTHRAG_EMBED_DIM must be at least 1".to_string()));
        }
        if self.embedding.model.is_empty() || self.llm.model.is_empty() {
            return Err(PipelineError::ConfigInvalid("model names must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| PipelineError::ConfigInvalid(format!("{}={:?}: {}", key, raw, e))),
    }
}

fn parse_flag<V>(var: &V, key: &str, default: bool) -> Result<bool>
where
    V: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(PipelineError::ConfigInvalid(format!("{}={:?}: expected a boolean", key, v))),
    }
}
