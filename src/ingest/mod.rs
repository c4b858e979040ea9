//! Ingestion Normalizer
//!
//! Turns heterogeneous raw authentication logs into [`EventSummary`] values
//! with a fully populated [`FeatureVector`]:
//! - typed coercion of dirty feature values (see [`coerce`])
//! - `recent_events` normalization or synthesis from the base record
//! - per-record and per-file failures are skipped with a warning
//!
//! # Example
//!
//! ```ignore
//! use authrag::ingest::Normalizer;
//!
//! let normalizer = Normalizer::new();
//! let (summaries, report) = normalizer.normalize_directory(Path::new("data"))?;
//! println!("{}", report);
//! ```

pub mod coerce;
pub mod reader;

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::types::{EventSummary, FeatureVector, RawLogRecord, RecentEvent, RecordId};

pub use coerce::{coerce_bool, coerce_float, coerce_int, safe_bool, safe_float, safe_int, Coerced, SPEED_MAP};
pub use reader::{discover_sources, load_source, SourceFormat};

/// Per-record normalization failure
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("record is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// A normalized record and the number of coercion warnings it raised
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub summary: EventSummary,
    pub warnings: usize,
}

/// Batch counters for the normalize stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_loaded: usize,
    pub records_skipped: usize,
    pub lines_skipped: usize,
    pub coercion_warnings: usize,
    pub summaries: usize,
}

impl fmt::Display for NormalizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "files read:         {}", self.files_read)?;
        writeln!(f, "files skipped:      {}", self.files_skipped)?;
        writeln!(f, "records loaded:     {}", self.records_loaded)?;
        writeln!(f, "records skipped:    {}", self.records_skipped + self.lines_skipped)?;
        writeln!(f, "values defaulted:   {}", self.coercion_warnings)?;
        write!(f, "summaries written:  {}", self.summaries)
    }
}

/// Raw record → event summary converter
///
/// The wall clock is sampled once per normalizer, so every synthesized
/// timestamp of a batch is identical.
#[derive(Debug, Clone)]
pub struct Normalizer {
    now: DateTime<Utc>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    /// Normalizer with a fixed clock
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Current time as RFC3339 UTC, whole seconds, trailing `Z`
    fn now_timestamp(&self) -> String {
        self.now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Strings pass through, numbers are epoch seconds, anything else is now
    fn timestamp_or_now(&self, value: Option<&Value>, id: &str) -> String {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => {
                let secs = n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64));
                match secs.and_then(|s| DateTime::from_timestamp(s, 0)) {
                    Some(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    None => {
                        warn!("record id={}: timestamp {} out of range, using now", id, n);
                        self.now_timestamp()
                    }
                }
            }
            _ => self.now_timestamp(),
        }
    }

    /// Normalize one raw JSON value
    pub fn normalize(&self, value: &Value) -> std::result::Result<NormalizedRecord, IngestError> {
        match value {
            Value::Object(record) => Ok(self.normalize_record(record)),
            Value::Array(_) => Err(IngestError::NotAnObject("array")),
            Value::String(_) => Err(IngestError::NotAnObject("string")),
            Value::Number(_) => Err(IngestError::NotAnObject("number")),
            Value::Bool(_) => Err(IngestError::NotAnObject("boolean")),
            Value::Null => Err(IngestError::NotAnObject("null")),
        }
    }

    /// Normalize one raw record
    pub fn normalize_record(&self, record: &RawLogRecord) -> NormalizedRecord {
        let id = record.get("id").and_then(RecordId::from_value);
        let id_str = id
            .as_ref()
            .map(|i| i.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let (features, warnings) = extract_features(record, &id_str);
        let recent_events = self.recent_events(record, &id_str);

        let summary = EventSummary {
            id,
            user_id: record.get("user_id").and_then(RecordId::from_value),
            recent_events,
            features,
            label: text_field(record.get("label")).unwrap_or_else(|| "unknown".to_string()),
        };

        NormalizedRecord { summary, warnings }
    }

    fn recent_events(&self, record: &RawLogRecord, id: &str) -> Vec<RecentEvent> {
        if let Some(Value::Array(items)) = record.get("recent_events") {
            let mut normalized = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_object() {
                    Some(ev) => normalized.push(RecentEvent {
                        timestamp: self.timestamp_or_now(ev.get("timestamp"), id),
                        outcome: text_field(ev.get("outcome")),
                        ip: text_field(ev.get("ip")),
                        device: text_field(ev.get("device").or_else(|| ev.get("device_info"))),
                    }),
                    None => warn!("record id={}: recent_events[{}] is not an object, dropped", id, i),
                }
            }
            if !normalized.is_empty() {
                return normalized;
            }
        }

        debug!("record id={}: synthesizing recent_events from base record", id);
        vec![RecentEvent {
            timestamp: self.timestamp_or_now(record.get("timestamp"), id),
            outcome: text_field(record.get("outcome")),
            ip: text_field(record.get("ip")),
            device: text_field(record.get("device_info")),
        }]
    }

    /// Read, normalize and count every record under `dir`
    pub fn normalize_directory(&self, dir: &Path) -> Result<(Vec<EventSummary>, NormalizeReport)> {
        let mut report = NormalizeReport::default();
        let mut summaries = Vec::new();

        for (path, format) in discover_sources(dir)? {
            let name = reader::display_name(&path);
            let loaded = match load_source(&path, format) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Skipping file {}: {}", name, e);
                    report.files_skipped += 1;
                    continue;
                }
            };

            report.files_read += 1;
            report.lines_skipped += loaded.skipped_lines;
            report.records_loaded += loaded.records.len();

            for (i, value) in loaded.records.iter().enumerate() {
                match self.normalize(value) {
                    Ok(normalized) => {
                        report.coercion_warnings += normalized.warnings;
                        summaries.push(normalized.summary);
                    }
                    Err(e) => {
                        warn!("Skipping record #{} of {}: {}", i + 1, name, e);
                        report.records_skipped += 1;
                    }
                }
            }
        }

        if report.records_loaded == 0 {
            return Err(PipelineError::EmptyInput {
                dir: dir.to_path_buf(),
            });
        }

        report.summaries = summaries.len();
        info!("Total records loaded: {}", report.records_loaded);
        Ok((summaries, report))
    }
}

/// Stringify a scalar field; `null` and absent become `None`
fn text_field(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Build the five-field feature vector from `extra_features`
fn extract_features(record: &RawLogRecord, id: &str) -> (FeatureVector, usize) {
    let empty = Map::new();
    let ef = record
        .get("extra_features")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let field = |primary: &str, alias: &str| ef.get(primary).or_else(|| ef.get(alias));

    let mut warnings = 0;
    let defaults = FeatureVector::default();
    let success_default = i64::from(record.get("outcome").and_then(Value::as_str) == Some("success"));

    let mut count = |name: &str, raw: Option<&Value>, default: i64, min: i64| -> u64 {
        let coerced = coerce_int(raw, default);
        let mut value = coerced.value();
        if coerced.is_lossy() {
            warn!("record id={}: {} non-numeric {} -> defaulted to {}", id, name, describe(raw), value);
            warnings += 1;
        } else if value < min {
            warn!("record id={}: {} out of range {} -> defaulted to {}", id, name, value, default);
            warnings += 1;
            value = default;
        }
        // min is never negative, so the cast is lossless
        value.max(min) as u64
    };

    let fail_count_5min = count("fail_count_5min", field("fail_count_5min", "fail_count"), 0, 0);
    let distinct_ips = count(
        "distinct_ips",
        field("distinct_ips", "distinct_ip_count"),
        defaults.distinct_ips as i64,
        1,
    );
    let success_count = count("success_count", ef.get("success_count"), success_default, 0);

    let raw_geo = field("geo_velocity", "velocity");
    let geo = coerce_float(raw_geo, defaults.geo_velocity);
    let mut geo_velocity = geo.value();
    if geo.is_lossy() {
        warn!(
            "record id={}: geo_velocity non-numeric {} -> mapped to {}",
            id,
            describe(raw_geo),
            geo_velocity
        );
        warnings += 1;
    }
    if !geo_velocity.is_finite() || geo_velocity < 0.0 {
        warn!("record id={}: geo_velocity out of range {} -> defaulted to 0", id, geo_velocity);
        warnings += 1;
        geo_velocity = defaults.geo_velocity;
    }

    let raw_device = ef.get("device_change");
    let device = coerce_bool(raw_device, defaults.device_change);
    if device.is_lossy() {
        warn!(
            "record id={}: device_change unrecognized {} -> defaulted to {}",
            id,
            describe(raw_device),
            device.value()
        );
        warnings += 1;
    }

    let features = FeatureVector {
        fail_count_5min,
        distinct_ips,
        geo_velocity,
        device_change: device.value(),
        success_count,
    };
    (features, warnings)
}

/// Persist summaries as a pretty-printed JSON array
pub fn write_summaries(path: &Path, summaries: &[EventSummary]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summaries).map_err(|e| PipelineError::json(path, e))?;
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

/// Load previously written summaries
pub fn load_summaries(path: &Path) -> Result<Vec<EventSummary>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| PipelineError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn fixed() -> Normalizer {
        Normalizer::at(Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap())
    }

    fn normalize(value: Value) -> NormalizedRecord {
        fixed().normalize(&value).unwrap()
    }

    #[test]
    fn test_defaults_for_bare_record() {
        let n = normalize(json!({"id": 1, "outcome": "failed"}));
        let f = &n.summary.features;
        assert_eq!(f.fail_count_5min, 0);
        assert_eq!(f.distinct_ips, 1);
        assert_eq!(f.geo_velocity, 0.0);
        assert!(!f.device_change);
        assert_eq!(f.success_count, 0);
        assert_eq!(n.warnings, 0);
        assert_eq!(n.summary.label, "unknown");
        assert_eq!(n.summary.id, Some(RecordId::Int(1)));
    }

    #[test]
    fn test_success_count_defaults_from_outcome() {
        let n = normalize(json!({"id": 2, "outcome": "success"}));
        assert_eq!(n.summary.features.success_count, 1);
    }

    #[test]
    fn test_dirty_values_single_warning() {
        let n = normalize(json!({
            "id": "evt-6",
            "outcome": "failed",
            "extra_features": {"geo_velocity": "low", "distinct_ips": "3"}
        }));
        assert_eq!(n.summary.features.geo_velocity, 10.0);
        assert_eq!(n.summary.features.distinct_ips, 3);
        assert_eq!(n.warnings, 1);
    }

    #[test]
    fn test_aliases() {
        let n = normalize(json!({
            "id": 3,
            "extra_features": {"fail_count": "4", "distinct_ip_count": 2, "velocity": 55.5}
        }));
        assert_eq!(n.summary.features.fail_count_5min, 4);
        assert_eq!(n.summary.features.distinct_ips, 2);
        assert_eq!(n.summary.features.geo_velocity, 55.5);
    }

    #[test]
    fn test_out_of_domain_values_defaulted() {
        let n = normalize(json!({
            "id": 4,
            "extra_features": {"fail_count_5min": -3, "distinct_ips": 0, "geo_velocity": -5}
        }));
        let f = &n.summary.features;
        assert_eq!(f.fail_count_5min, 0);
        assert_eq!(f.distinct_ips, 1);
        assert_eq!(f.geo_velocity, 0.0);
        assert_eq!(n.warnings, 3);
    }

    #[test]
    fn test_extra_features_not_object() {
        let n = normalize(json!({"id": 5, "extra_features": "junk"}));
        assert_eq!(n.summary.features, FeatureVector::default());
    }

    #[test]
    fn test_epoch_timestamps_become_rfc3339() {
        let n = normalize(json!({"id": 8, "timestamp": 1697270400, "outcome": "failed"}));
        assert_eq!(n.summary.recent_events[0].timestamp, "2023-10-14T08:00:00Z");

        let n = normalize(json!({
            "id": 9,
            "recent_events": [{"timestamp": 1697270400.75, "outcome": "success"}]
        }));
        assert_eq!(n.summary.recent_events[0].timestamp, "2023-10-14T08:00:00Z");

        let n = normalize(json!({"id": 10, "timestamp": i64::MAX}));
        assert_eq!(n.summary.recent_events[0].timestamp, "2025-10-14T12:00:00Z");
    }

    #[test]
    fn test_recent_events_synthesized() {
        let n = normalize(json!({
            "id": 7,
            "timestamp": "2025-10-14T10:00:00Z",
            "outcome": "failed",
            "ip": "192.168.1.100",
            "device_info": "firefox"
        }));
        let events = &n.summary.recent_events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, "2025-10-14T10:00:00Z");
        assert_eq!(events[0].outcome.as_deref(), Some("failed"));
        assert_eq!(events[0].ip.as_deref(), Some("192.168.1.100"));
        assert_eq!(events[0].device.as_deref(), Some("firefox"));
    }

    #[test]
    fn test_missing_timestamp_is_rfc3339_utc() {
        let n = Normalizer::new().normalize(&json!({"id": 8})).unwrap();
        let ts = &n.summary.recent_events[0].timestamp;
        let re = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap();
        assert!(re.is_match(ts), "bad timestamp {}", ts);
    }

    #[test]
    fn test_recent_events_normalized() {
        let n = normalize(json!({
            "id": 9,
            "recent_events": [
                {"outcome": "failed", "ip": "1.1.1.1", "device_info": "d1"},
                "garbage",
                {"timestamp": "2025-10-14T09:00:00Z", "outcome": "success", "device": "d2"}
            ]
        }));
        let events = &n.summary.recent_events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, "2025-10-14T12:00:00Z");
        assert_eq!(events[0].device.as_deref(), Some("d1"));
        assert_eq!(events[1].device.as_deref(), Some("d2"));
        assert_eq!(n.summary.outcome(), Some("success"));
    }

    #[test]
    fn test_empty_recent_events_falls_back() {
        let n = normalize(json!({"id": 10, "recent_events": [], "outcome": "success"}));
        assert_eq!(n.summary.recent_events.len(), 1);
        assert_eq!(n.summary.outcome(), Some("success"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(fixed().normalize(&json!([1, 2])).is_err());
        assert!(fixed().normalize(&json!("x")).is_err());
    }

    #[test]
    fn test_directory_order_and_skips() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"id\": 3}\nnot json\n{\"id\": 4}\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"id": 1}, 42, {"id": 2}]"#).unwrap();
        fs::write(dir.path().join("c.json"), "{broken").unwrap();

        let (summaries, report) = fixed().normalize_directory(dir.path()).unwrap();
        let ids: Vec<String> = summaries.iter().map(|s| s.id_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(report.files_read, 2);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.records_skipped, 1);
        assert_eq!(report.lines_skipped, 1);
        assert_eq!(report.summaries, 4);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempdir().unwrap();
        let err = fixed().normalize_directory(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { .. }));
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(
            data.join("logs.json"),
            r#"[{"id": 1, "timestamp": "2025-10-14T10:00:00Z", "outcome": "failed",
                 "extra_features": {"geo_velocity": "high"}}]"#,
        )
        .unwrap();

        let out_a = dir.path().join("a.json");
        let out_b = dir.path().join("b.json");
        let (first, _) = Normalizer::new().normalize_directory(&data).unwrap();
        write_summaries(&out_a, &first).unwrap();
        let (second, _) = Normalizer::new().normalize_directory(&data).unwrap();
        write_summaries(&out_b, &second).unwrap();

        assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
        assert_eq!(load_summaries(&out_a).unwrap(), first);
    }
}
