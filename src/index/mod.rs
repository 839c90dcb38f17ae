// Index module
// Exhaustive nearest-neighbour search over embedding vectors and the metadata paired with them

pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use thiserror::Error;

use crate::corpus::Chunk;

pub use store::IndexStore;

/// Structural problems while building, searching or publishing an index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no embeddings were created")]
    NoVectors,

    #[error("index dimension must be greater than zero")]
    ZeroDimension,

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector component {position} is not finite")]
    NonFinite { position: usize },

    #[error("{vectors} vectors but {chunks} metadata entries")]
    CardinalityMismatch { vectors: usize, chunks: usize },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted index could not be opened; the serving process cannot start without it
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("No index found at {path}; run `course-rag build` first")]
    Missing { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid index pointer in {path}: {reason}")]
    InvalidPointer { path: PathBuf, reason: String },

    #[error("Corrupt vector file {path}: {reason}")]
    CorruptVectors { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Index has {vectors} vectors but {chunks} metadata entries")]
    CardinalityMismatch { vectors: usize, chunks: usize },
}

/// One search result: the ordinal of a stored vector and its squared L2 distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub ordinal: usize,
    pub distance: f32,
}

/// How an index version was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u16,
    pub embedding_model: String,
    pub dimension: usize,
    pub entries: usize,
    pub stored_text_chars: usize,
    pub built_at: DateTime<Utc>,
}

/// Flat (brute-force) vector index; rows are stored contiguously in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Empty index accepting vectors of `dimension` components
    #[inline]
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Bulk build; the first vector fixes the dimension
    #[inline]
    pub fn build<I>(vectors: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        let mut vectors = vectors.into_iter();
        let first = vectors.next().ok_or(IndexError::NoVectors)?;
        let mut index = Self::new(first.len())?;
        index.data.reserve(first.len() * (vectors.size_hint().0 + 1));
        index.add(&first)?;
        for vector in vectors {
            index.add(&vector)?;
        }
        Ok(index)
    }

    /// Rebuild from a row-major buffer, as read back from disk
    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        let mut index = Self::new(dimension)?;
        if data.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        check_finite(&data)?;
        index.data = data;
        Ok(index)
    }

    /// Append one vector and return its ordinal
    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check_query(vector)?;
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension).nth(ordinal)
    }

    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    /// The `k` stored vectors nearest to `query`, ascending by distance, ties by ordinal
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_query(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, row)| SearchHit {
                ordinal,
                distance: squared_l2(query, row),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k, compare_hits);
            hits.truncate(k);
        }
        hits.sort_unstable_by(compare_hits);
        Ok(hits)
    }

    fn check_query(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        check_finite(vector)
    }
}

fn check_finite(values: &[f32]) -> Result<(), IndexError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(IndexError::NonFinite { position }),
        None => Ok(()),
    }
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// A loaded index together with the chunk behind every ordinal
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    index: VectorIndex,
    chunks: Vec<Chunk>,
    manifest: Option<IndexManifest>,
}

impl KnowledgeBase {
    #[inline]
    pub fn new(index: VectorIndex, chunks: Vec<Chunk>) -> Result<Self, IndexLoadError> {
        if index.len() != chunks.len() {
            return Err(IndexLoadError::CardinalityMismatch {
                vectors: index.len(),
                chunks: chunks.len(),
            });
        }
        Ok(Self {
            index,
            chunks,
            manifest: None,
        })
    }

    /// Pair vectors and chunks without the cardinality check
    #[cfg(test)]
    pub(crate) fn new_unchecked(index: VectorIndex, chunks: Vec<Chunk>) -> Self {
        Self {
            index,
            chunks,
            manifest: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_manifest(mut self, manifest: IndexManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn chunk(&self, ordinal: usize) -> Option<&Chunk> {
        self.chunks.get(ordinal)
    }

    #[inline]
    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
