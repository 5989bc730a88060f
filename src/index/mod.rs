// Vector index module
// Exact inner-product index over unit vectors, its manifest, and persistence

pub mod builder;
pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Entry;
use crate::embeddings::Embedding;
use crate::{FaqError, Result};

pub use builder::IndexBuilder;

/// Bumped whenever the persisted layout changes incompatibly
pub const FORMAT_VERSION: u32 = 2;

/// Flat (brute-force) index. Position `i` holds the vector of the `i`-th entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn from_vectors(dimension: usize, vectors: &[Embedding]) -> Result<Self> {
        if dimension == 0 {
            return Err(FaqError::Embedding(
                "index dimension must be > 0".to_string(),
            ));
        }

        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(FaqError::Embedding(format!(
                    "vector at position {} has {} dimensions, expected {}",
                    position,
                    vector.len(),
                    dimension
                )));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(FaqError::Embedding(format!(
                    "vector at position {} contains non-finite values",
                    position
                )));
            }
            flat.extend_from_slice(vector);
        }

        Ok(Self {
            dimension,
            vectors: flat,
        })
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start.checked_add(self.dimension)?)
    }

    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension)
    }

    /// Exact top-k by inner product.
    ///
    /// Returns `(position, score)` pairs, highest score first. Equal scores
    /// keep ascending position order.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(FaqError::Embedding(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .iter()
            .map(|vector| dot(vector, query))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Describes a persisted index. Stored as `entries.json` next to the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub model: String,
    pub dimension: usize,
    pub count: usize,
    pub built_at: DateTime<Utc>,
    /// Entry id for each index position, in position order
    pub entry_ids: Vec<String>,
    /// [`Entry::content_digest`] of the text encoded at each position
    pub entry_digests: Vec<String>,
}

/// A flat index plus the entry ids its positions belong to
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    index: FlatIndex,
    manifest: IndexManifest,
}

impl VectorIndex {
    #[inline]
    pub fn new(index: FlatIndex, entries: &[Entry], model: impl Into<String>) -> Result<Self> {
        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            model: model.into(),
            dimension: index.dimension(),
            count: entries.len(),
            built_at: Utc::now(),
            entry_ids: entries.iter().map(|e| e.id.clone()).collect(),
            entry_digests: entries.iter().map(Entry::content_digest).collect(),
        };
        Self::from_parts(index, manifest)
    }

    /// Pair an index with a manifest, checking that they describe each other
    #[inline]
    pub fn from_parts(index: FlatIndex, manifest: IndexManifest) -> Result<Self> {
        if manifest.count != manifest.entry_ids.len() {
            return Err(FaqError::IndexCorrupt(format!(
                "manifest count {} does not match its {} entry ids",
                manifest.count,
                manifest.entry_ids.len()
            )));
        }
        if manifest.entry_digests.len() != manifest.entry_ids.len() {
            return Err(FaqError::IndexCorrupt(format!(
                "manifest lists {} entry ids but {} content digests",
                manifest.entry_ids.len(),
                manifest.entry_digests.len()
            )));
        }
        if index.len() != manifest.entry_ids.len() {
            return Err(FaqError::IndexCorrupt(format!(
                "index holds {} vectors but {} entry ids",
                index.len(),
                manifest.entry_ids.len()
            )));
        }
        if index.dimension() != manifest.dimension {
            return Err(FaqError::IndexCorrupt(format!(
                "index dimension {} does not match manifest dimension {}",
                index.dimension(),
                manifest.dimension
            )));
        }
        Ok(Self { index, manifest })
    }

    #[inline]
    pub const fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub const fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[inline]
    pub fn entry_ids(&self) -> &[String] {
        &self.manifest.entry_ids
    }

    #[inline]
    pub fn entry_digests(&self) -> &[String] {
        &self.manifest.entry_digests
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.manifest.model
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn into_parts(self) -> (FlatIndex, IndexManifest) {
        (self.index, self.manifest)
    }
}
