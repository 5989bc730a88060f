//! Lazily acquired encoder handle
//!
//! Model acquisition (connecting to the embedding server, checking that the
//! model exists) happens on the first encode call and exactly once per
//! process, even under concurrent first calls. After that the handle is
//! read-only shared state with no teardown. A failed acquisition is not
//! remembered: the next call tries again, leaving retry policy to the caller.


use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::{debug, info, warn};

use super::{Embedding, Encoder};
use crate::Result;

type InitFn<E> = Box<dyn Fn() -> Result<E> + Send + Sync>;

pub struct LazyEncoder<E> {
    model_id: String,
    dimension: usize,
    init: InitFn<E>,
    cell: OnceLock<E>,
    init_lock: Mutex<()>,
}

impl<E: Encoder> LazyEncoder<E> {
    /// `model_id` and `dimension` must describe what `init` will produce;
    /// they are reported before the backend is acquired.
    #[inline]
    pub fn new<F>(model_id: impl Into<String>, dimension: usize, init: F) -> Self
    where
        F: Fn() -> Result<E> + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            dimension,
            init: Box::new(init),
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Acquire the backend, initializing it on first use
    #[inline]
    pub fn get(&self) -> Result<&E> {
        if let Some(encoder) = self.cell.get() {
            return Ok(encoder);
        }

        // Serialize initializers; losers of the race find the cell filled.
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(encoder) = self.cell.get() {
            return Ok(encoder);
        }

        debug!("Acquiring encoder backend for model {}", self.model_id);
        match (self.init)() {
            Ok(encoder) => {
                if encoder.model_id() != self.model_id || encoder.dimension() != self.dimension {
                    warn!(
                        "Encoder backend reports {} ({} dims), handle was declared as {} ({} dims)",
                        encoder.model_id(),
                        encoder.dimension(),
                        self.model_id,
                        self.dimension
                    );
                }
                info!("Encoder backend for model {} is ready", self.model_id);
                Ok(self.cell.get_or_init(|| encoder))
            }
            Err(e) => {
                warn!("Encoder acquisition failed: {}", e);
                Err(e)
            }
        }
    }
}

impl<E: Encoder> Encoder for LazyEncoder<E> {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.get()?.embed_batch(texts)
    }
}

impl<E> fmt::Debug for LazyEncoder<E> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEncoder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("initialized", &self.cell.get().is_some())
            .finish_non_exhaustive()
    }
}
