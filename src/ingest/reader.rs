//! Raw log discovery and loading
//!
//! `.json` files hold a single record or an array of records, `.jsonl`
//! files hold one record per line. Broken files and broken lines are
//! skipped with a warning; they never abort the batch.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Source file layout, decided by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.json`: one object or an array of objects
    JsonDocument,
    /// `.jsonl`: one object per line
    JsonLines,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SourceFormat::JsonDocument),
            "jsonl" => Some(SourceFormat::JsonLines),
            _ => None,
        }
    }
}

/// Records read from one file, plus what had to be dropped
#[derive(Debug, Default)]
pub struct LoadedFile {
    pub records: Vec<Value>,
    /// Unparsable lines (JSONL only)
    pub skipped_lines: usize,
}

/// List input files in lexical order of their file names
pub fn discover_sources(dir: &Path) -> Result<Vec<(PathBuf, SourceFormat)>> {
    if !dir.is_dir() {
        return Err(PipelineError::ResourceMissing {
            path: dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut sources: Vec<(PathBuf, SourceFormat)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| SourceFormat::from_path(&path).map(|fmt| (path, fmt)))
        .collect();

    sources.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(sources)
}

/// Load a `.json` document; a non-array document counts as one record
pub fn load_json_document(path: &Path) -> Result<LoadedFile> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::json(path, e))?;

    let records = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    Ok(LoadedFile {
        records,
        skipped_lines: 0,
    })
}

/// Load a `.jsonl` file, skipping blank and unparsable lines
pub fn load_json_lines(path: &Path) -> Result<LoadedFile> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let name = display_name(path);
    let mut loaded = LoadedFile::default();

    for (i, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => loaded.records.push(value),
            Err(e) => {
                warn!("JSONL parse error in {} line {}: {}", name, i + 1, e);
                loaded.skipped_lines += 1;
            }
        }
    }

    Ok(loaded)
}

/// Load one discovered source according to its format
pub fn load_source(path: &Path, format: SourceFormat) -> Result<LoadedFile> {
    let loaded = match format {
        SourceFormat::JsonDocument => load_json_document(path)?,
        SourceFormat::JsonLines => load_json_lines(path)?,
    };
    info!("Loaded {} records from {}", loaded.records.len(), display_name(path));
    Ok(loaded)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_by_suffix() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a.json")),
            Some(SourceFormat::JsonDocument)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("b.JSONL")),
            Some(SourceFormat::JsonLines)
        );
        assert_eq!(SourceFormat::from_path(Path::new("c.txt")), None);
        assert_eq!(SourceFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.jsonl"), "{}\n").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let sources = discover_sources(dir.path()).unwrap();
        let names: Vec<String> = sources.iter().map(|(p, _)| display_name(p)).collect();
        assert_eq!(names, vec!["a.json", "b.jsonl"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempdir().unwrap();
        let err = discover_sources(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceMissing { .. }));
    }

    #[test]
    fn test_json_document_single_and_array() {
        let dir = tempdir().unwrap();
        let single = dir.path().join("single.json");
        fs::write(&single, r#"{"id": 1}"#).unwrap();
        assert_eq!(load_json_document(&single).unwrap().records.len(), 1);

        let array = dir.path().join("array.json");
        fs::write(&array, r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(load_json_document(&array).unwrap().records.len(), 2);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "[{").unwrap();
        assert!(matches!(
            load_json_document(&broken),
            Err(PipelineError::Json { .. })
        ));
    }

    #[test]
    fn test_json_lines_skips_bad_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(&path, "{\"id\": 1}\n\nnot json\n{\"id\": 2}\n").unwrap();

        let loaded = load_json_lines(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped_lines, 1);
    }

    #[test]
    fn test_json_lines_invalid_utf8_line_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut bytes = b"{\"id\": 1}\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"{\"id\": 3}\r\n");
        fs::write(&path, bytes).unwrap();

        let loaded = load_json_lines(&path).unwrap();
        let ids: Vec<i64> = loaded.records.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(loaded.skipped_lines, 1);
    }
}
