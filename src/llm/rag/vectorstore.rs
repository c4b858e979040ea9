//! Vector Store for RAG
//!
//! Exact (flat) nearest-neighbor index over passage embeddings plus the
//! metadata table aligned to it: row `i` of the index is passage `i`.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::Passage;

const INDEX_MAGIC: &[u8; 8] = b"ARAGIDX1";
const HEADER_LEN: usize = 8 + 4 + 4 + 1;

/// Similarity metric of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Inner product on L2-normalised vectors (cosine)
    #[serde(rename = "ip")]
    InnerProduct,
    /// Squared euclidean distance, reported negated so higher is better
    #[serde(rename = "l2")]
    L2,
}

impl Default for Metric {
    fn default() -> Self {
        Self::InnerProduct
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" | "inner_product" | "cosine" => Ok(Self::InnerProduct),
            "l2" => Ok(Self::L2),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::InnerProduct => write!(f, "ip"),
            Metric::L2 => write!(f, "l2"),
        }
    }
}

impl Metric {
    fn code(self) -> u8 {
        match self {
            Metric::InnerProduct => 0,
            Metric::L2 => 1,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Metric::InnerProduct),
            1 => Some(Metric::L2),
            _ => None,
        }
    }
}

/// Flat f32 index, rows stored contiguously
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one row
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(PipelineError::CorruptIndex(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dim,
                vector.len()
            )));
        }
        let start = self.data.len();
        self.data.extend_from_slice(vector);
        if self.metric == Metric::InnerProduct {
            l2_normalize(&mut self.data[start..]);
        }
        Ok(())
    }

    /// Top-k rows as `(row, score)`, best first, ties by row index
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(PipelineError::CorruptIndex(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let mut q = query.to_vec();
        if self.metric == Metric::InnerProduct {
            l2_normalize(&mut q);
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| {
                let score = match self.metric {
                    Metric::InnerProduct => dot(&q, v),
                    Metric::L2 => -squared_l2(&q, v),
                };
                (row, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.push(self.metric.code());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..8] != INDEX_MAGIC {
            return Err(PipelineError::CorruptIndex("bad index header".to_string()));
        }
        let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let rows = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let metric = Metric::from_code(bytes[16])
            .ok_or_else(|| PipelineError::CorruptIndex(format!("unknown metric code {}", bytes[16])))?;

        let body = &bytes[HEADER_LEN..];
        if dim == 0 || body.len() != rows * dim * 4 {
            return Err(PipelineError::CorruptIndex(format!(
                "index body is {} bytes, expected {} rows x {} dims",
                body.len(),
                rows,
                dim
            )));
        }

        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dim, metric, data })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::write(path, self.to_bytes()).map_err(|e| PipelineError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_bytes(&bytes)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Scale to unit length; zero vectors are left alone
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Metadata row
    pub row: usize,
    /// Similarity (higher is better)
    pub score: f32,
    pub passage: Passage,
}

/// Index plus aligned passage metadata, immutable once built
#[derive(Debug, Clone)]
pub struct VectorStore {
    index: FlatIndex,
    meta: Vec<Passage>,
}

impl VectorStore {
    /// Pair an index with its metadata; row counts must agree
    pub fn new(index: FlatIndex, meta: Vec<Passage>) -> Result<Self> {
        if index.len() != meta.len() {
            return Err(PipelineError::CorruptIndex(format!(
                "index has {} rows but metadata has {} entries",
                index.len(),
                meta.len()
            )));
        }
        Ok(Self { index, meta })
    }

    /// Load a persisted index and its metadata table
    pub fn open(index_path: &Path, meta_path: &Path) -> Result<Self> {
        let index = FlatIndex::load(index_path)?;
        let file = File::open(meta_path).map_err(|e| PipelineError::io(meta_path, e))?;
        let meta: Vec<Passage> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| PipelineError::json(meta_path, e))?;

        let store = Self::new(index, meta)?;
        info!(
            "Loaded vector index: {} rows, dim {}, metric {}",
            store.len(),
            store.dim(),
            store.index.metric()
        );
        Ok(store)
    }

    pub fn save(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        self.index.save(index_path)?;
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let file = File::create(meta_path).map_err(|e| PipelineError::io(meta_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.meta).map_err(|e| PipelineError::json(meta_path, e))?;
        writer.flush().map_err(|e| PipelineError::io(meta_path, e))
    }

    /// Nearest passages to an embedded query
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let hits = self.index.search(query_embedding, top_k)?;
        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|(row, score)| {
                let passage = self.meta.get(row)?;
                if passage.content.trim().is_empty() {
                    return None;
                }
                Some(SearchResult {
                    row,
                    score,
                    passage: passage.clone(),
                })
            })
            .collect();
        debug!("Vector search returned {} results", results.len());
        Ok(results)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }
}
