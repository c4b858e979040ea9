//! Normalized authentication events
//!
//! Flat, fixed-shape summaries derived from raw log records. Downstream
//! stages (retrieval, prompting, rule overlay) only ever see these.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw log record as read from disk (opaque key/value mapping)
pub type RawLogRecord = serde_json::Map<String, Value>;

/// Identifier of a record or a user, kept in its source representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    /// Numbers outside `i64` (large unsigned, floats), kept verbatim
    Num(serde_json::Number),
    Text(String),
}

impl RecordId {
    /// Extract an id from an arbitrary JSON value (`null` means no id)
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(RecordId::Int(i)),
                None => Some(RecordId::Num(n.clone())),
            },
            Value::String(s) => Some(RecordId::Text(s.clone())),
            other => Some(RecordId::Text(other.to_string())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{}", i),
            RecordId::Num(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of an event's recent authentication history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEvent {
    /// RFC3339 UTC timestamp
    pub timestamp: String,
    pub outcome: Option<String>,
    pub ip: Option<String>,
    pub device: Option<String>,
}

/// Per-event feature summary, always fully populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Failed attempts within the last five minutes
    pub fail_count_5min: u64,
    /// Distinct source IPs (at least the originating one)
    pub distinct_ips: u64,
    /// Implied travel speed between successive logins (km/h)
    pub geo_velocity: f64,
    pub device_change: bool,
    pub success_count: u64,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            fail_count_5min: 0,
            distinct_ips: 1,
            geo_velocity: 0.0,
            device_change: false,
            success_count: 0,
        }
    }
}

/// Normalized event summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: Option<RecordId>,
    pub user_id: Option<RecordId>,
    /// Never empty
    pub recent_events: Vec<RecentEvent>,
    pub features: FeatureVector,
    /// Ground-truth label if the source carried one, `"unknown"` otherwise
    pub label: String,
}

impl EventSummary {
    /// Outcome of the most recent authentication attempt
    pub fn outcome(&self) -> Option<&str> {
        self.recent_events.last().and_then(|e| e.outcome.as_deref())
    }

    /// Display form of the id for logs and file names
    pub fn id_string(&self) -> String {
        self.id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_from_value() {
        assert_eq!(RecordId::from_value(&json!(7)), Some(RecordId::Int(7)));
        assert_eq!(
            RecordId::from_value(&json!("evt-1")),
            Some(RecordId::Text("evt-1".into()))
        );
        assert_eq!(RecordId::from_value(&Value::Null), None);
        assert_eq!(RecordId::from_value(&json!(1.5)).unwrap().to_string(), "1.5");
    }

    #[test]
    fn test_record_id_keeps_numbers_outside_i64() {
        for raw in ["18446744073709551615", "1.5"] {
            let source: Value = serde_json::from_str(raw).unwrap();
            let id = RecordId::from_value(&source).unwrap();
            assert!(matches!(id, RecordId::Num(_)));
            assert_eq!(serde_json::to_value(&id).unwrap(), source);
            assert_eq!(serde_json::to_string(&id).unwrap(), raw);
        }
    }

    #[test]
    fn test_record_id_serializes_in_source_form() {
        assert_eq!(serde_json::to_string(&RecordId::Int(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&RecordId::Text("a".into())).unwrap(),
            "\"a\""
        );
    }

    #[test]
    fn test_summary_field_order() {
        let summary = EventSummary {
            id: Some(RecordId::Int(1)),
            user_id: None,
            recent_events: vec![RecentEvent {
                timestamp: "2025-10-14T10:00:00Z".into(),
                outcome: Some("failed".into()),
                ip: None,
                device: None,
            }],
            features: FeatureVector::default(),
            label: "unknown".into(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        let id_pos = json.find("\"id\"").unwrap();
        let recent_pos = json.find("\"recent_events\"").unwrap();
        let features_pos = json.find("\"features\"").unwrap();
        assert!(id_pos < recent_pos && recent_pos < features_pos);
        assert_eq!(summary.outcome(), Some("failed"));
    }
}
