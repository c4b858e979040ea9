//! Event classifier
//!
//! Retrieves evidence for an event, asks the model for a verdict under the
//! classification prompt contract and validates the answer. Transport,
//! timeout and schema failures never escape: they turn into the fallback
//! verdict and a warning naming the record. When the rule overlay is on,
//! a matching feature rule overrides the model and both verdicts are logged.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::prompts::{ClassificationPrompt, PromptContext, PromptTemplate, PROMPT_VERSION};
use super::provider::{CompletionRequest, LlmProvider};
use super::rag::{RetrievalError, Retriever};
use super::rules::{self, OverlayRule};
use crate::config::LlmConfig;
use crate::types::{EventSummary, Label, RecordId, Verdict};

/// Model output that does not honor the verdict schema
#[derive(Debug, Error)]
pub enum VerdictError {
    /// Not a JSON document (including JSON wrapped in extra text)
    #[error("response is not JSON: {0}")]
    NotJson(String),
    /// JSON, but wrong shape, wrong types or unknown keys
    #[error("response violates the verdict schema: {0}")]
    Schema(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    label: String,
    score: f64,
    top_indicators: Vec<String>,
}

/// Strictly parse a model answer into a verdict
///
/// The score is clamped, indicators are cut to three, and a label outside
/// the closed set collapses to `normal` with score 0.0.
pub fn parse_verdict(text: &str) -> Result<Verdict, VerdictError> {
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| VerdictError::NotJson(e.to_string()))?;
    if !value.is_object() {
        return Err(VerdictError::Schema("expected a JSON object".to_string()));
    }
    let raw: RawVerdict = serde_json::from_value(value).map_err(|e| VerdictError::Schema(e.to_string()))?;

    match raw.label.parse::<Label>() {
        Ok(label) => Ok(Verdict::new(label, raw.score, raw.top_indicators)),
        Err(_) => {
            debug!("Model label {:?} outside the label set, collapsing to normal", raw.label);
            Ok(Verdict::new(Label::Normal, 0.0, raw.top_indicators))
        }
    }
}

/// Why an event ended with the fallback verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Passage retrieval failed (embedding service or index)
    Retrieval,
    /// Network error or non-success status from the completion endpoint
    Transport,
    /// Completion did not arrive within the per-call timeout
    Timeout,
    /// Answer was not a schema-conforming JSON object
    Schema,
    /// Worker task died
    Aborted,
}

/// Classification result for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: Option<RecordId>,
    /// Version of the prompt template the verdict was requested with
    pub prompt_version: String,
    /// Effective verdict
    pub verdict: Verdict,
    /// Verdict from the model path (fallback included), before any override
    pub llm_verdict: Verdict,
    /// Overlay rule that replaced the model verdict
    pub rule: Option<OverlayRule>,
    /// Model path degraded to the fallback verdict
    pub fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
}

impl Classification {
    fn degraded(id: Option<RecordId>, reason: FallbackReason) -> Self {
        Self {
            id,
            prompt_version: PROMPT_VERSION.to_string(),
            verdict: Verdict::fallback(),
            llm_verdict: Verdict::fallback(),
            rule: None,
            fallback: true,
            fallback_reason: Some(reason),
        }
    }
}

/// Batch result
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One entry per started event, in input order
    pub classifications: Vec<Classification>,
    /// Events not started before the deadline
    pub skipped: usize,
}

/// Classifier statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierStats {
    pub total: u64,
    /// Model answers accepted
    pub successful: u64,
    pub fallbacks: u64,
    pub rule_overrides: u64,
    /// Completions received within the timeout
    pub responses: u64,
    /// Average completion latency (ms)
    pub avg_latency_ms: u64,
}

/// Event classifier, shared by all batch workers
pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    retriever: Arc<Retriever>,
    template: ClassificationPrompt,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
    rule_overlay: bool,
    stats: RwLock<ClassifierStats>,
}

impl Classifier {
    pub fn new(provider: Arc<dyn LlmProvider>, retriever: Arc<Retriever>, config: &LlmConfig) -> Self {
        Self {
            provider,
            retriever,
            template: ClassificationPrompt::new(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            rule_overlay: false,
            stats: RwLock::new(ClassifierStats::default()),
        }
    }

    /// Enable or disable the deterministic rule overlay
    pub fn with_rule_overlay(mut self, enabled: bool) -> Self {
        self.rule_overlay = enabled;
        self
    }

    pub async fn stats(&self) -> ClassifierStats {
        self.stats.read().await.clone()
    }

    /// Log provider reachability; never fails the batch
    pub async fn check_provider(&self) {
        match self.provider.health_check().await {
            Ok(health) if health.available => info!(
                "LLM provider {} reachable ({} ms)",
                health.provider,
                health.latency_ms.unwrap_or_default()
            ),
            Ok(health) => warn!(
                "LLM provider {} health check returned unavailable: {}",
                health.provider,
                health.error.unwrap_or_default()
            ),
            Err(e) => warn!("LLM provider health check failed: {}", e),
        }
    }

    /// Retrieve passages and render the full prompt for an event
    pub async fn build_prompt(&self, summary: &EventSummary) -> Result<String, RetrievalError> {
        let passages = self.retriever.retrieve(summary).await?;
        Ok(self.template.build_prompt(&PromptContext::new(summary, &passages)))
    }

    /// Classify one event
    pub async fn classify(&self, summary: &EventSummary) -> Classification {
        let id = summary.id_string();
        let rule = if self.rule_overlay { rules::evaluate(summary) } else { None };

        let (llm_verdict, fallback_reason) = self.model_verdict(summary, &id).await;

        let verdict = match rule {
            Some(rule) => {
                let overlay = rule.verdict(&summary.features);
                info!(
                    "record id={}: rule {} -> {} (llm said {} {:.2})",
                    id, rule, overlay.label, llm_verdict.label, llm_verdict.score
                );
                overlay
            }
            None => llm_verdict.clone(),
        };

        {
            let mut stats = self.stats.write().await;
            stats.total += 1;
            if fallback_reason.is_some() {
                stats.fallbacks += 1;
            } else {
                stats.successful += 1;
            }
            if rule.is_some() {
                stats.rule_overrides += 1;
            }
        }

        Classification {
            id: summary.id.clone(),
            prompt_version: PROMPT_VERSION.to_string(),
            verdict,
            llm_verdict,
            rule,
            fallback: fallback_reason.is_some(),
            fallback_reason,
        }
    }

    async fn model_verdict(&self, summary: &EventSummary, id: &str) -> (Verdict, Option<FallbackReason>) {
        let prompt = match self.build_prompt(summary).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("record id={}: retrieval failed, using fallback verdict: {}", id, e);
                return (Verdict::fallback(), Some(FallbackReason::Retrieval));
            }
        };

        let request = CompletionRequest::new(prompt)
            .with_system(self.template.system_prompt())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let start = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("record id={}: LLM request failed, using fallback verdict: {}", id, e);
                return (Verdict::fallback(), Some(FallbackReason::Transport));
            }
            Err(_) => {
                warn!(
                    "record id={}: LLM request timed out after {}s, using fallback verdict",
                    id,
                    self.timeout.as_secs()
                );
                return (Verdict::fallback(), Some(FallbackReason::Timeout));
            }
        };
        self.record_latency(start.elapsed().as_millis() as u64).await;

        match parse_verdict(&response.text) {
            Ok(verdict) => {
                debug!("record id={}: llm verdict {} {:.2}", id, verdict.label, verdict.score);
                (verdict, None)
            }
            Err(e) => {
                warn!("record id={}: {}, using fallback verdict", id, e);
                (Verdict::fallback(), Some(FallbackReason::Schema))
            }
        }
    }

    async fn record_latency(&self, latency_ms: u64) {
        let mut stats = self.stats.write().await;
        stats.responses += 1;
        stats.avg_latency_ms = (stats.avg_latency_ms * (stats.responses - 1) + latency_ms) / stats.responses;
    }

    /// Classify a batch on `workers` concurrent tasks
    ///
    /// Results keep input order. With a deadline, events not yet started
    /// when it passes are skipped (and logged); started ones finish.
    pub async fn classify_batch(
        self: &Arc<Self>,
        summaries: Vec<EventSummary>,
        workers: usize,
        deadline: Option<Duration>,
    ) -> BatchOutcome {
        let total = summaries.len();
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut ids: Vec<Option<RecordId>> = Vec::with_capacity(total);
        let mut dispatched = vec![false; total];
        let mut skipped = 0usize;

        for (idx, summary) in summaries.into_iter().enumerate() {
            ids.push(summary.id.clone());

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                error!("Worker pool closed, stopping dispatch");
                break;
            };

            if deadline.is_some_and(|limit| started.elapsed() >= limit) {
                warn!("record id={}: batch deadline passed, not classified", summary.id_string());
                skipped += 1;
                continue;
            }

            dispatched[idx] = true;
            let classifier = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                (idx, classifier.classify(&summary).await)
            });
        }

        let mut slots: Vec<Option<Classification>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, classification)) => slots[idx] = Some(classification),
                Err(e) => error!("Classification task failed: {}", e),
            }
        }

        let classifications = slots
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| dispatched[*idx])
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    let id = ids.get(idx).cloned().flatten();
                    warn!(
                        "record id={}: worker aborted, using fallback verdict",
                        id.as_ref().map(|i| i.to_string()).unwrap_or_else(|| "unknown".to_string())
                    );
                    Classification::degraded(id, FallbackReason::Aborted)
                })
            })
            .collect();

        BatchOutcome {
            classifications,
            skipped,
        }
    }
}
