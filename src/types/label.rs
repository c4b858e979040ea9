//! Attack categories
//!
//! The closed label set every verdict and every corpus passage draws from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Attack category assigned to an authentication event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    CredentialStuffing,
    BruteForce,
    PhishingAttempt,
    SessionHijack,
    MalwareActivity,
    InsiderThreat,
    Normal,
}

impl Label {
    /// Every label, in canonical order
    pub const ALL: [Label; 7] = [
        Label::CredentialStuffing,
        Label::BruteForce,
        Label::PhishingAttempt,
        Label::SessionHijack,
        Label::MalwareActivity,
        Label::InsiderThreat,
        Label::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::CredentialStuffing => "credential_stuffing",
            Label::BruteForce => "brute_force",
            Label::PhishingAttempt => "phishing_attempt",
            Label::SessionHijack => "session_hijack",
            Label::MalwareActivity => "malware_activity",
            Label::InsiderThreat => "insider_threat",
            Label::Normal => "normal",
        }
    }

    /// Comma separated list used in prompts
    pub fn joined() -> String {
        Label::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::Normal
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| format!("unknown label: {}", s))
    }
}
