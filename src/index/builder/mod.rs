
use tracing::{debug, info};

use super::{FlatIndex, VectorIndex};
use crate::catalog::Entry;
use crate::embeddings::{Embedding, Encoder, is_unit};
use crate::{FaqError, Result};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Encodes entries in catalog order and assembles a [`VectorIndex`]
pub struct IndexBuilder<'a> {
    encoder: &'a dyn Encoder,
    batch_size: usize,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(encoder: &'a dyn Encoder) -> Self {
        Self {
            encoder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn build(&self, entries: &[Entry]) -> Result<VectorIndex> {
        self.build_with_progress(entries, |_, _| {})
    }

    /// Like [`IndexBuilder::build`], reporting `(encoded, total)` after each batch
    #[inline]
    pub fn build_with_progress<F>(&self, entries: &[Entry], mut progress: F) -> Result<VectorIndex>
    where
        F: FnMut(usize, usize),
    {
        if entries.is_empty() {
            return Err(FaqError::MalformedCatalog(
                "cannot build an index from zero entries".to_string(),
            ));
        }

        let total = entries.len();
        info!(
            "Building index for {} entries with model {}",
            total,
            self.encoder.model_id()
        );

        let texts: Vec<String> = entries.iter().map(Entry::canonical_text).collect();
        let mut vectors: Vec<Embedding> = Vec::with_capacity(total);

        for batch in texts.chunks(self.batch_size) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let encoded = self.encoder.encode_many(&refs)?;
            vectors.extend(encoded);
            debug!("Encoded {}/{} entries", vectors.len(), total);
            progress(vectors.len(), total);
        }

        debug_assert!(vectors.iter().all(|v| is_unit(v)));

        let index = FlatIndex::from_vectors(self.encoder.dimension(), &vectors)?;
        let built = VectorIndex::new(index, entries, self.encoder.model_id())?;

        info!(
            "Built index with {} vectors of dimension {}",
            built.len(),
            built.index().dimension()
        );
        Ok(built)
    }
}
