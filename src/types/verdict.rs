//! Classification verdicts

use serde::{Deserialize, Serialize};

use super::Label;

/// Maximum number of indicators kept on a verdict
pub const MAX_INDICATORS: usize = 3;

/// Structured classification result for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    /// Confidence in `[0.0, 1.0]`
    pub score: f64,
    /// At most three short indicators
    pub top_indicators: Vec<String>,
}

impl Verdict {
    /// Build a verdict, clamping the score and truncating indicators
    pub fn new(label: Label, score: f64, mut top_indicators: Vec<String>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        top_indicators.truncate(MAX_INDICATORS);
        Self {
            label,
            score,
            top_indicators,
        }
    }

    /// `{label: normal, score: 0.0, top_indicators: []}`
    pub fn fallback() -> Self {
        Self {
            label: Label::Normal,
            score: 0.0,
            top_indicators: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::fallback()
    }
}
