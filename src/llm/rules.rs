//! Deterministic rule overlay
//!
//! Ordered feature rules that may override the model verdict when the
//! overlay is enabled. The first matching rule wins; no match keeps the
//! model output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EventSummary, FeatureVector, Label, Verdict};

/// Geo velocity (km/h) treated as "high"; the value `high` maps to exactly this
pub const HIGH_GEO_VELOCITY: f64 = 600.0;

/// Confidence carried by a rule verdict
const RULE_SCORE: f64 = 1.0;

/// Overlay rule, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayRule {
    /// Many IPs, one failure each
    CredentialStuffing,
    /// Many failures from a single IP
    BruteForce,
    /// Successful login at impossible travel speed
    AccountTakeover,
    /// Impossible travel speed without a success
    MultiGeoAnomaly,
}

impl OverlayRule {
    pub fn label(&self) -> Label {
        match self {
            OverlayRule::CredentialStuffing => Label::CredentialStuffing,
            OverlayRule::BruteForce => Label::BruteForce,
            OverlayRule::AccountTakeover | OverlayRule::MultiGeoAnomaly => Label::SessionHijack,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OverlayRule::CredentialStuffing => "credential_stuffing",
            OverlayRule::BruteForce => "brute_force",
            OverlayRule::AccountTakeover => "account_takeover",
            OverlayRule::MultiGeoAnomaly => "multi_geo_anomaly",
        }
    }

    /// Verdict issued when this rule fires
    pub fn verdict(&self, features: &FeatureVector) -> Verdict {
        let indicators = match self {
            OverlayRule::CredentialStuffing => vec![
                format!("distinct_ips={}", features.distinct_ips),
                format!("fail_count_5min={}", features.fail_count_5min),
            ],
            OverlayRule::BruteForce => vec![
                format!("fail_count_5min={}", features.fail_count_5min),
                "single source IP".to_string(),
            ],
            OverlayRule::AccountTakeover => vec![
                format!("geo_velocity={}", features.geo_velocity),
                "successful login".to_string(),
            ],
            OverlayRule::MultiGeoAnomaly => vec![format!("geo_velocity={}", features.geo_velocity)],
        };
        Verdict::new(self.label(), RULE_SCORE, indicators)
    }
}

impl fmt::Display for OverlayRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First rule matching the event, if any
pub fn evaluate(summary: &EventSummary) -> Option<OverlayRule> {
    let f = &summary.features;

    if f.distinct_ips > 2 && f.fail_count_5min == 1 {
        return Some(OverlayRule::CredentialStuffing);
    }
    if f.fail_count_5min > 3 && f.distinct_ips == 1 {
        return Some(OverlayRule::BruteForce);
    }
    if f.geo_velocity >= HIGH_GEO_VELOCITY {
        if summary.outcome() == Some("success") {
            return Some(OverlayRule::AccountTakeover);
        }
        return Some(OverlayRule::MultiGeoAnomaly);
    }
    None
}
