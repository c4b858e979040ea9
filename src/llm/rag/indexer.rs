//! Corpus indexing
//!
//! Embeds every passage once and pairs the resulting flat index with the
//! passage table, row for row.

use std::fmt;

use tracing::{debug, info};

use super::vectorstore::{FlatIndex, Metric, VectorStore};
use crate::error::{PipelineError, Result};
use crate::llm::embedding::EmbeddingModel;
use crate::types::Passage;

/// Passages per embedding call
pub const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of an index build
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub passages: usize,
    pub dim: usize,
    pub metric: Metric,
    pub batches: usize,
    pub model: String,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "passages indexed: {}", self.passages)?;
        writeln!(f, "embedding dim:    {}", self.dim)?;
        writeln!(f, "metric:           {}", self.metric)?;
        writeln!(f, "embedding model:  {}", self.model)?;
        write!(f, "batches:          {}", self.batches)
    }
}

/// Embed `passages` and build an in-memory store
pub async fn build_store(
    passages: Vec<Passage>,
    embedder: &dyn EmbeddingModel,
    metric: Metric,
) -> Result<(VectorStore, IndexReport)> {
    let mut index: Option<FlatIndex> = None;
    let mut batches = 0usize;

    for chunk in passages.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|p| p.content.clone()).collect();
        let vectors = embedder
            .encode(&texts)
            .await
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(PipelineError::CorruptIndex(format!(
                "embedding model returned {} vectors for {} passages",
                vectors.len(),
                texts.len()
            )));
        }

        for vector in &vectors {
            let index = index.get_or_insert_with(|| FlatIndex::new(vector.len(), metric));
            if vector.is_empty() {
                return Err(PipelineError::CorruptIndex("embedding model returned an empty vector".to_string()));
            }
            index.add(vector)?;
        }

        batches += 1;
        debug!("Embedded batch {} ({} passages)", batches, chunk.len());
    }

    let index = index.unwrap_or_else(|| FlatIndex::new(0, metric));
    let report = IndexReport {
        passages: passages.len(),
        dim: index.dim(),
        metric,
        batches,
        model: embedder.name().to_string(),
    };
    let store = VectorStore::new(index, passages)?;

    info!(
        "Built index of {} passages (dim {}, {} batches)",
        report.passages, report.dim, report.batches
    );
    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusBuilder;
    use crate::llm::embedding::HashingEmbedder;
    use crate::llm::provider::LlmError;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct RaggedEmbedder;

    #[async_trait]
    impl EmbeddingModel for RaggedEmbedder {
        fn name(&self) -> &str {
            "ragged"
        }

        async fn encode(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().enumerate().map(|(i, _)| vec![1.0; 2 + i % 2]).collect())
        }
    }

    #[derive(Debug)]
    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingModel for DownEmbedder {
        fn name(&self) -> &str {
            "down"
        }

        async fn encode(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Connection("refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_rows_match_passages() {
        let passages = CorpusBuilder::default().build();
        let total = passages.len();
        let (store, report) = build_store(passages, &HashingEmbedder::new(64), Metric::InnerProduct)
            .await
            .unwrap();

        assert_eq!(store.len(), total);
        assert_eq!(report.passages, total);
        assert_eq!(report.dim, 64);
        assert_eq!(report.batches, (total + EMBED_BATCH_SIZE - 1) / EMBED_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_inconsistent_dimensions_rejected() {
        let passages = CorpusBuilder::new(2, 1).build();
        let err = build_store(passages, &RaggedEmbedder, Metric::L2).await.unwrap_err();
        assert!(matches!(err, PipelineError::CorruptIndex(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure() {
        let passages = CorpusBuilder::new(1, 1).build();
        let err = build_store(passages, &DownEmbedder, Metric::L2).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
    }
}
