//! RAG Retriever
//!
//! Returns the top-k corpus passages for an event. Dense retrieval embeds a
//! stable textual rendering of the event and searches the vector store;
//! lexical retrieval scores passages by token overlap with a keyword
//! expanded descriptor and needs no embedding model.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::vectorstore::VectorStore;
use crate::error::PipelineError;
use crate::llm::embedding::EmbeddingModel;
use crate::llm::provider::LlmError;
use crate::types::{EventSummary, Passage};

/// Failure, English and French vocabulary appended to lexical queries
pub const EXPANSION_KEYWORDS: &[&str] = &[
    "failed",
    "échec",
    "tentative",
    "brute",
    "force",
    "password",
    "mot de passe",
    "essais",
    "session",
    "hijack",
    "takeover",
    "simultaneous",
    "simultané",
    "geo",
    "velocity",
    "géographique",
    "device_change",
    "changement",
    "post_logout",
    "déconnexion",
    "renew",
    "renouvellement",
    "sensitive",
    "sensible",
    "action",
    "password_change",
    "changement_mot_passe",
    "multi",
    "géolocalisation",
    "travel",
    "voyage",
    "anomal",
    "impossible",
];

/// Retrieval failures; the classifier turns these into the fallback verdict
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("index search failed: {0}")]
    Index(#[from] PipelineError),
}

/// Stable textual rendering of an event used as the dense query
pub fn event_query(summary: &EventSummary) -> String {
    let features = serde_json::to_string(&summary.features).unwrap_or_default();
    let recent = serde_json::to_string(&summary.recent_events).unwrap_or_default();
    format!("Features: {}; Recent events: {}", features, recent)
}

/// Append the domain keywords to a free-form descriptor
pub fn expand_query(text: &str) -> String {
    format!("{} {}", text, EXPANSION_KEYWORDS.join(" "))
}

/// Rank passages by how many query tokens occur in their content
///
/// Returns `(row, score)` pairs, zero scores dropped, best first, ties by
/// row index.
pub fn lexical_rank(query: &str, passages: &[Passage], k: usize) -> Vec<(usize, usize)> {
    let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();

    let mut scored: Vec<(usize, usize)> = passages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.content.trim().is_empty())
        .map(|(row, p)| {
            let content = p.content.to_lowercase();
            let score = tokens.iter().filter(|t| content.contains(t.as_str())).count();
            (row, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Short descriptor of the latest attempt, e.g. `login failed 10.0.0.1`
fn event_descriptor(summary: &EventSummary) -> String {
    let mut descriptor = String::from("login");
    if let Some(event) = summary.recent_events.last() {
        for part in [&event.outcome, &event.ip].into_iter().flatten() {
            descriptor.push(' ');
            descriptor.push_str(part);
        }
    }
    descriptor
}

enum Backend {
    Dense {
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
    },
    Lexical {
        passages: Arc<Vec<Passage>>,
    },
}

/// Passage retriever, shared read-only across classification workers
pub struct Retriever {
    backend: Backend,
    top_k: usize,
}

impl Retriever {
    /// Nearest-neighbor retrieval over a loaded index
    pub fn dense(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingModel>, top_k: usize) -> Self {
        Self {
            backend: Backend::Dense { store, embedder },
            top_k,
        }
    }

    /// Token-overlap retrieval over the raw corpus
    pub fn lexical(passages: Vec<Passage>, top_k: usize) -> Self {
        Self {
            backend: Backend::Lexical {
                passages: Arc::new(passages),
            },
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn mode_name(&self) -> &'static str {
        match self.backend {
            Backend::Dense { .. } => "dense",
            Backend::Lexical { .. } => "lexical",
        }
    }

    /// Top-k passages for an event, most relevant first
    pub async fn retrieve(&self, summary: &EventSummary) -> Result<Vec<Passage>, RetrievalError> {
        let passages = match &self.backend {
            Backend::Dense { .. } => self.dense_search(&event_query(summary)).await?,
            Backend::Lexical { passages } => {
                Self::lexical_search(passages, &expand_query(&event_descriptor(summary)), self.top_k)
            }
        };
        debug!(
            "Retrieved {} passages for record id={}",
            passages.len(),
            summary.id_string()
        );
        Ok(passages)
    }

    /// Top-k passages for a free-form descriptor such as `login failed 10.0.0.1`
    pub async fn retrieve_descriptor(&self, text: &str) -> Result<Vec<Passage>, RetrievalError> {
        match &self.backend {
            Backend::Dense { .. } => self.dense_search(text).await,
            Backend::Lexical { passages } => Ok(Self::lexical_search(passages, &expand_query(text), self.top_k)),
        }
    }

    async fn dense_search(&self, query: &str) -> Result<Vec<Passage>, RetrievalError> {
        let Backend::Dense { store, embedder } = &self.backend else {
            return Ok(Vec::new());
        };

        let mut embeddings = embedder.encode(&[query.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("No embedding returned".to_string()))?;

        let results = store.search(&embedding, self.top_k)?;
        Ok(results.into_iter().map(|r| r.passage).collect())
    }

    fn lexical_search(passages: &[Passage], query: &str, k: usize) -> Vec<Passage> {
        lexical_rank(query, passages, k)
            .into_iter()
            .map(|(row, _)| passages[row].clone())
            .collect()
    }
}
