//! Pipeline stages
//!
//! One function per batch entry point. Each stage reads its inputs from the
//! configured directories, writes its artifact and returns a report that
//! the binary prints on stdout.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{PipelineConfig, RetrievalMode};
use crate::corpus::{self, CorpusBuilder};
use crate::error::{PipelineError, Result};
use crate::ingest::{self, NormalizeReport, Normalizer};
use crate::llm::prompts::{ClassificationPrompt, PromptContext, PromptTemplate, PROMPT_VERSION};
use crate::llm::rag::{self, IndexReport, Retriever, VectorStore};
use crate::llm::{create_embedder, Classification, Classifier, LlmError, LlmProvider, OpenAiProvider};
use crate::types::{EventSummary, Label, Passage};

/// Corpus stage counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusReport {
    pub passages: usize,
    pub labels: usize,
    pub path: PathBuf,
}

impl fmt::Display for CorpusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "labels:             {}", self.labels)?;
        writeln!(f, "passages written:   {}", self.passages)?;
        write!(f, "corpus:             {}", self.path.display())
    }
}

/// Generate the attack-pattern corpus
pub fn run_build_corpus(config: &PipelineConfig) -> Result<CorpusReport> {
    let passages = CorpusBuilder::new(config.corpus.passages_per_label, config.corpus.seed).build();
    let path = config.paths.corpus_path();
    corpus::save_passages(&path, &passages)?;

    Ok(CorpusReport {
        passages: passages.len(),
        labels: Label::ALL.len(),
        path,
    })
}

/// Normalize every raw log file into `event_summaries.json`
pub fn run_normalize(config: &PipelineConfig) -> Result<NormalizeReport> {
    let (summaries, report) = Normalizer::new().normalize_directory(&config.paths.data_dir)?;
    let path = config.paths.summaries_path();
    ingest::write_summaries(&path, &summaries)?;
    info!("Wrote {} event summaries to {}", summaries.len(), path.display());
    Ok(report)
}

/// Embed the corpus and persist index plus metadata
pub async fn run_build_index(config: &PipelineConfig) -> Result<IndexReport> {
    let corpus_path = config.paths.corpus_path();
    let passages = corpus::load_passages(&corpus_path)?;
    if passages.is_empty() {
        return Err(PipelineError::EmptyInput { dir: corpus_path });
    }

    let embedder = create_embedder(&config.embedding)?;
    let (store, report) = rag::build_store(passages, embedder.as_ref(), config.retrieval.metric).await?;
    store.save(&config.paths.index_path(), &config.paths.meta_path())?;
    info!("Index saved to {}", config.paths.index_path().display());
    Ok(report)
}

/// Open the retriever the configuration asks for
///
/// `auto` picks dense retrieval when both index files exist and lexical
/// retrieval over the corpus otherwise.
pub fn open_retriever(config: &PipelineConfig) -> Result<Retriever> {
    let index_path = config.paths.index_path();
    let meta_path = config.paths.meta_path();
    let top_k = config.retrieval.top_k;

    let dense = match config.retrieval.mode {
        RetrievalMode::Dense => true,
        RetrievalMode::Lexical => false,
        RetrievalMode::Auto => {
            let present = index_path.is_file() && meta_path.is_file();
            if !present {
                info!("No vector index under {}, using lexical retrieval", config.paths.prepared_dir.display());
            }
            present
        }
    };

    if dense {
        let store = VectorStore::open(&index_path, &meta_path)?;
        let embedder = create_embedder(&config.embedding)?;
        return Ok(Retriever::dense(Arc::new(store), embedder, top_k));
    }

    Ok(Retriever::lexical(lexical_passages(config)?, top_k))
}

fn lexical_passages(config: &PipelineConfig) -> Result<Vec<Passage>> {
    match corpus::load_passages(&config.paths.corpus_path()) {
        Err(PipelineError::ResourceMissing { path }) => {
            let meta_path = config.paths.meta_path();
            if !meta_path.is_file() {
                return Err(PipelineError::ResourceMissing { path });
            }
            warn!("{} missing, reading passages from {}", path.display(), meta_path.display());
            corpus::load_passages(&meta_path)
        }
        other => other,
    }
}

fn load_events(config: &PipelineConfig) -> Result<Vec<EventSummary>> {
    let path = config.paths.summaries_path();
    let summaries = ingest::load_summaries(&path)?;
    if summaries.is_empty() {
        return Err(PipelineError::EmptyInput { dir: path });
    }
    Ok(summaries)
}

/// Prompt stage counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptReport {
    pub events: usize,
    pub written: usize,
    pub failed: usize,
    pub retrieval: &'static str,
    pub dir: PathBuf,
}

impl fmt::Display for PromptReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "events loaded:      {}", self.events)?;
        writeln!(f, "retrieval:          {}", self.retrieval)?;
        writeln!(f, "prompts written:    {}", self.written)?;
        writeln!(f, "retrieval failures: {}", self.failed)?;
        write!(f, "prompts dir:        {}", self.dir.display())
    }
}

/// File name of an event's prompt
pub fn prompt_file_name(summary: &EventSummary, row: usize) -> String {
    match &summary.id {
        Some(id) => {
            let safe: String = id
                .to_string()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
                .collect();
            format!("prompt_{}.txt", safe)
        }
        None => format!("prompt_row{}.txt", row),
    }
}

/// Write one composed prompt per event, up to the configured limit
pub async fn run_build_prompts(config: &PipelineConfig) -> Result<PromptReport> {
    let summaries = load_events(config)?;
    let retriever = open_retriever(config)?;
    let template = ClassificationPrompt::new();
    let dir = config.paths.prompts_dir();
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let mut written = 0usize;
    let mut failed = 0usize;
    let mut used_names = HashSet::new();
    for (row, summary) in summaries.iter().take(config.classifier.prompt_limit).enumerate() {
        let passages = match retriever.retrieve(summary).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!("record id={}: retrieval failed, prompt not written: {}", summary.id_string(), e);
                failed += 1;
                continue;
            }
        };
        let prompt = template.build_prompt(&PromptContext::new(summary, &passages));
        let mut name = prompt_file_name(summary, row);
        if !used_names.insert(name.clone()) {
            let renamed = format!("{}_row{}.txt", name.trim_end_matches(".txt"), row);
            warn!(
                "record id={}: prompt file {} already written, using {}",
                summary.id_string(),
                name,
                renamed
            );
            used_names.insert(renamed.clone());
            name = renamed;
        }
        let path = dir.join(name);
        fs::write(&path, prompt).map_err(|e| PipelineError::io(&path, e))?;
        written += 1;
    }

    info!("Prompts written to {}", dir.display());
    Ok(PromptReport {
        events: summaries.len(),
        written,
        failed,
        retrieval: retriever.mode_name(),
        dir,
    })
}

/// Classify stage counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyReport {
    pub events: usize,
    pub classified: usize,
    pub fallbacks: usize,
    pub rule_overrides: usize,
    /// Not started before the batch deadline
    pub skipped: usize,
    /// Events carrying a ground-truth label from the label set
    pub labelled: usize,
    /// Labelled events whose verdict matches the ground truth
    pub agreeing: usize,
    pub by_label: BTreeMap<Label, usize>,
    pub retrieval: String,
    /// Completions received within the timeout
    pub responses: u64,
    pub avg_latency_ms: u64,
    pub prompt_version: &'static str,
}

impl fmt::Display for ClassifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "events loaded:      {}", self.events)?;
        writeln!(f, "retrieval:          {}", self.retrieval)?;
        writeln!(f, "prompt version:     {}", self.prompt_version)?;
        writeln!(f, "classified:         {}", self.classified)?;
        writeln!(f, "llm responses:      {}", self.responses)?;
        writeln!(f, "avg llm latency:    {} ms", self.avg_latency_ms)?;
        writeln!(f, "fallback verdicts:  {}", self.fallbacks)?;
        writeln!(f, "rule overrides:     {}", self.rule_overrides)?;
        writeln!(f, "skipped (deadline): {}", self.skipped)?;
        for (label, count) in &self.by_label {
            writeln!(f, "  {:<20}{}", label.as_str(), count)?;
        }
        write!(f, "ground truth agree: {}/{}", self.agreeing, self.labelled)
    }
}

/// Classify every event against the configured completion endpoint
pub async fn run_classify(config: &PipelineConfig) -> Result<ClassifyReport> {
    config.llm.require_api_key()?;
    let provider = OpenAiProvider::new(config.llm.clone()).map_err(|e| match e {
        LlmError::Authentication(msg) => PipelineError::ConfigInvalid(msg),
        other => PipelineError::ConfigInvalid(other.to_string()),
    })?;
    run_classify_with(config, Arc::new(provider)).await
}

/// Classify every event with an explicit provider
pub async fn run_classify_with(config: &PipelineConfig, provider: Arc<dyn LlmProvider>) -> Result<ClassifyReport> {
    let summaries = load_events(config)?;
    let retriever = Arc::new(open_retriever(config)?);
    let retrieval = retriever.mode_name().to_string();

    let classifier = Arc::new(
        Classifier::new(provider, retriever, &config.llm).with_rule_overlay(config.classifier.rule_overlay),
    );
    classifier.check_provider().await;

    let ground_truth: Vec<Option<Label>> = summaries.iter().map(|s| s.label.parse::<Label>().ok()).collect();
    let events = summaries.len();
    let deadline = config.classifier.deadline_secs.map(Duration::from_secs);

    let outcome = classifier
        .classify_batch(summaries, config.classifier.workers, deadline)
        .await;

    write_verdicts(&config.paths.verdicts_path(), &outcome.classifications)?;
    let stats = classifier.stats().await;

    // skipped events only ever trail the batch, so positions line up
    let mut report = ClassifyReport {
        events,
        classified: outcome.classifications.len(),
        skipped: outcome.skipped,
        retrieval,
        responses: stats.responses,
        avg_latency_ms: stats.avg_latency_ms,
        prompt_version: PROMPT_VERSION,
        ..ClassifyReport::default()
    };
    for (classification, truth) in outcome.classifications.iter().zip(&ground_truth) {
        *report.by_label.entry(classification.verdict.label).or_insert(0) += 1;
        if classification.fallback {
            report.fallbacks += 1;
        }
        if classification.rule.is_some() {
            report.rule_overrides += 1;
        }
        if let Some(truth) = truth {
            report.labelled += 1;
            if *truth == classification.verdict.label {
                report.agreeing += 1;
            }
        }
    }

    info!(
        "Classified {} of {} events ({} fallback)",
        report.classified, report.events, report.fallbacks
    );
    Ok(report)
}

fn write_verdicts(path: &Path, classifications: &[Classification]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, classifications).map_err(|e| PipelineError::json(path, e))?;
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingBackend;
    use crate::types::{FeatureVector, RecentEvent, RecordId};
    use tempfile::tempdir;

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.data_dir = root.join("data");
        config.paths.prepared_dir = root.join("prepared");
        config.embedding.backend = EmbeddingBackend::Hashing;
        config.embedding.dim = 64;
        config
    }

    fn summary(id: Option<RecordId>) -> EventSummary {
        EventSummary {
            id,
            user_id: None,
            recent_events: vec![RecentEvent {
                timestamp: "2025-10-14T10:00:00Z".to_string(),
                outcome: Some("failed".to_string()),
                ip: None,
                device: None,
            }],
            features: FeatureVector::default(),
            label: "unknown".to_string(),
        }
    }

    #[test]
    fn test_prompt_file_names() {
        assert_eq!(prompt_file_name(&summary(Some(RecordId::Int(12))), 0), "prompt_12.txt");
        assert_eq!(
            prompt_file_name(&summary(Some(RecordId::Text("a/b c".to_string()))), 0),
            "prompt_a_b_c.txt"
        );
        assert_eq!(prompt_file_name(&summary(None), 7), "prompt_row7.txt");
    }

    #[test]
    fn test_normalize_empty_dir_fails() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.paths.data_dir).unwrap();
        assert!(matches!(run_normalize(&config), Err(PipelineError::EmptyInput { .. })));
    }

    #[test]
    fn test_normalize_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            run_normalize(&config(dir.path())),
            Err(PipelineError::ResourceMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_index_requires_corpus() {
        let dir = tempdir().unwrap();
        let err = run_build_index(&config(dir.path())).await.unwrap_err();
        assert!(matches!(err, PipelineError::ResourceMissing { .. }));
    }

    #[tokio::test]
    async fn test_corpus_then_index() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let corpus = run_build_corpus(&config).unwrap();
        assert_eq!(corpus.passages, 7 * 12);

        let index = run_build_index(&config).await.unwrap();
        assert_eq!(index.passages, corpus.passages);
        assert!(config.paths.index_path().is_file());
        assert!(config.paths.meta_path().is_file());

        let store = VectorStore::open(&config.paths.index_path(), &config.paths.meta_path()).unwrap();
        assert_eq!(store.len(), corpus.passages);
    }

    #[test]
    fn test_retriever_mode_selection() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        run_build_corpus(&config).unwrap();

        assert_eq!(open_retriever(&config).unwrap().mode_name(), "lexical");

        config.retrieval.mode = RetrievalMode::Dense;
        assert!(matches!(
            open_retriever(&config),
            Err(PipelineError::ResourceMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_prefers_dense_when_indexed() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        run_build_corpus(&config).unwrap();
        run_build_index(&config).await.unwrap();
        assert_eq!(open_retriever(&config).unwrap().mode_name(), "dense");
    }

    #[tokio::test]
    async fn test_colliding_prompt_names_not_overwritten() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        run_build_corpus(&config).unwrap();
        let summaries = vec![
            summary(Some(RecordId::Text("a/b".to_string()))),
            summary(Some(RecordId::Text("a_b".to_string()))),
            summary(Some(RecordId::Text("a_b".to_string()))),
        ];
        ingest::write_summaries(&config.paths.summaries_path(), &summaries).unwrap();

        let report = run_build_prompts(&config).await.unwrap();
        assert_eq!(report.written, 3);

        let prompts = config.paths.prompts_dir();
        assert!(prompts.join("prompt_a_b.txt").is_file());
        assert!(prompts.join("prompt_a_b_row1.txt").is_file());
        assert!(prompts.join("prompt_a_b_row2.txt").is_file());
        assert_eq!(fs::read_dir(&prompts).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_classify_requires_api_key() {
        let dir = tempdir().unwrap();
        let err = run_classify(&config(dir.path())).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConfigInvalid(_)));
    }
}
