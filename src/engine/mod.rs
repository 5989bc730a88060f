//! Retrieval engine
//!
//! Holds the live index behind an atomically swappable pointer. Searches take
//! a snapshot and never lock; installing a rebuilt index replaces the pointer
//! without touching snapshots already handed out.


use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};

use crate::catalog::{Catalog, Entry};
use crate::embeddings::Encoder;
use crate::index::{FlatIndex, IndexManifest, VectorIndex, store};
use crate::{FaqError, Result};

/// One ranked hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: Arc<Entry>,
    /// Cosine similarity between the query and the entry's canonical text
    pub score: f32,
    /// Position of the entry in the index
    pub position: usize,
}

/// Ranked hits, best first, plus the `k` they were asked for
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResults {
    hits: Vec<SearchResult>,
    requested: usize,
}

impl SearchResults {
    #[inline]
    pub fn hits(&self) -> &[SearchResult] {
        &self.hits
    }

    #[inline]
    pub fn into_hits(self) -> Vec<SearchResult> {
        self.hits
    }

    #[inline]
    pub const fn requested(&self) -> usize {
        self.requested
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Fewer hits than requested: the index holds fewer than `k` entries
    #[inline]
    pub fn is_short(&self) -> bool {
        self.hits.len() < self.requested
    }

    #[inline]
    pub fn best(&self) -> Option<&SearchResult> {
        self.hits.first()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.hits.iter()
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Index joined with the catalog entries it was built from
#[derive(Debug)]
struct KnowledgeIndex {
    index: FlatIndex,
    entries: Vec<Arc<Entry>>,
    manifest: IndexManifest,
}

pub struct RetrievalEngine {
    encoder: Arc<dyn Encoder>,
    loaded: ArcSwapOption<KnowledgeIndex>,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            loaded: ArcSwapOption::empty(),
        }
    }

    #[inline]
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.loaded.load().is_some()
    }

    /// Manifest of the installed index, if any
    #[inline]
    pub fn manifest(&self) -> Option<IndexManifest> {
        self.loaded.load().as_ref().map(|k| k.manifest.clone())
    }

    /// Number of searchable entries; zero before an index is installed
    #[inline]
    pub fn len(&self) -> usize {
        self.loaded.load().as_ref().map_or(0, |k| k.entries.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join `index` to `catalog` and make it the live index.
    ///
    /// The index must have been built from exactly this catalog with this
    /// engine's encoder, down to the text of every entry; anything else is a
    /// stale or foreign index and is rejected as corrupt so the caller
    /// rebuilds.
    #[inline]
    pub fn install(&self, index: VectorIndex, catalog: &Catalog) -> Result<()> {
        if index.model() != self.encoder.model_id() {
            return Err(FaqError::IndexCorrupt(format!(
                "index was built with model '{}' but the encoder is '{}'",
                index.model(),
                self.encoder.model_id()
            )));
        }
        if index.index().dimension() != self.encoder.dimension() {
            return Err(FaqError::IndexCorrupt(format!(
                "index has dimension {} but the encoder produces {}",
                index.index().dimension(),
                self.encoder.dimension()
            )));
        }

        let by_id: HashMap<&str, &Entry> =
            catalog.entries().iter().map(|e| (e.id.as_str(), e)).collect();
        let mut seen = HashSet::with_capacity(index.len());
        let mut entries = Vec::with_capacity(index.len());

        for (id, digest) in index.entry_ids().iter().zip(index.entry_digests()) {
            let entry = by_id.get(id.as_str()).ok_or_else(|| {
                FaqError::IndexCorrupt(format!("index references unknown entry '{}'", id))
            })?;
            if !seen.insert(id.as_str()) {
                return Err(FaqError::IndexCorrupt(format!(
                    "index lists entry '{}' more than once",
                    id
                )));
            }
            if entry.content_digest() != *digest {
                return Err(FaqError::IndexCorrupt(format!(
                    "catalog entry '{}' changed since the index was built",
                    id
                )));
            }
            entries.push(Arc::new((*entry).clone()));
        }

        if let Some(missing) = catalog.ids().find(|id| !seen.contains(id)) {
            return Err(FaqError::IndexCorrupt(format!(
                "catalog entry '{}' is not in the index",
                missing
            )));
        }

        let (index, manifest) = index.into_parts();
        info!(
            "Installing index with {} entries (model {}, built {})",
            entries.len(),
            manifest.model,
            manifest.built_at
        );
        self.loaded.store(Some(Arc::new(KnowledgeIndex {
            index,
            entries,
            manifest,
        })));
        Ok(())
    }

    /// Load a persisted index from `dir` and install it
    #[inline]
    pub async fn load_from(&self, dir: &Path, catalog: &Catalog) -> Result<()> {
        let index = store::load(dir).await?;
        self.install(index, catalog)
    }

    /// Top `k` entries for `query`, best first.
    ///
    /// Returns at most `min(k, entries)` hits. Equal scores keep index order.
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Result<SearchResults> {
        let knowledge = self.loaded.load_full().ok_or(FaqError::EngineNotReady)?;

        let query = query.trim();
        if query.is_empty() {
            return Err(FaqError::InvalidQuery(
                "query is empty or whitespace".to_string(),
            ));
        }
        if k == 0 {
            return Ok(SearchResults::default());
        }

        let vector = self.encoder.encode(query)?;
        let hits = knowledge
            .index
            .search(&vector, k)?
            .into_iter()
            .map(|(position, score)| SearchResult {
                entry: Arc::clone(&knowledge.entries[position]),
                score,
                position,
            })
            .collect::<Vec<_>>();

        debug!(
            "Query matched {} of {} requested (best score {:?})",
            hits.len(),
            k,
            hits.first().map(|h| h.score)
        );
        Ok(SearchResults { hits, requested: k })
    }
}

impl std::fmt::Debug for RetrievalEngine {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("model", &self.encoder.model_id())
            .field("entries", &self.len())
            .finish()
    }
}
