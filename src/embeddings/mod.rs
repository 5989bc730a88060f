// Embeddings module
// Encoder trait shared by the Ollama and hashed backends, plus the lazy handle

pub mod hashed;
pub mod lazy;
pub mod ollama;


use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, EncoderBackend};
use crate::{FaqError, Result};

pub use hashed::HashedEncoder;
pub use lazy::LazyEncoder;
pub use ollama::OllamaClient;

/// Unit-length embedding vector
pub type Embedding = Vec<f32>;

/// Tolerance used when checking that a vector has unit length
pub const NORM_TOLERANCE: f32 = 1e-4;

/// Maps text into a fixed-dimensional vector space.
///
/// Backends implement [`Encoder::embed_batch`]; callers use
/// [`Encoder::encode`] and [`Encoder::encode_many`], which always return
/// L2-normalized vectors whether or not the backend already normalizes.
pub trait Encoder: Send + Sync {
    /// Identifier of the model and version producing the vectors
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Raw backend output, one vector per input, in input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    #[inline]
    fn encode(&self, text: &str) -> Result<Embedding> {
        self.encode_many(&[text])?
            .pop()
            .ok_or_else(|| FaqError::Embedding("encoder returned no vector".to_string()))
    }

    #[inline]
    fn encode_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self.embed_batch(texts)?;
        if raw.len() != texts.len() {
            return Err(FaqError::Embedding(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                raw.len()
            )));
        }

        let dimension = self.dimension();
        raw.into_iter()
            .map(|mut vector| {
                if vector.len() != dimension {
                    return Err(FaqError::Embedding(format!(
                        "model '{}' returned {} dimensions, expected {}",
                        self.model_id(),
                        vector.len(),
                        dimension
                    )));
                }
                normalize(&mut vector)?;
                Ok(vector)
            })
            .collect()
    }
}

/// Scale a vector to unit length in place.
///
/// A zero or non-finite vector cannot represent a direction and is rejected.
#[inline]
pub fn normalize(vector: &mut [f32]) -> Result<()> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(FaqError::Embedding(
            "vector contains non-finite values".to_string(),
        ));
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return Err(FaqError::Embedding("vector has zero length".to_string()));
    }

    for x in vector.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[inline]
pub fn is_unit(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() <= NORM_TOLERANCE
}

/// Build the encoder selected in the configuration.
///
/// The Ollama backend is wrapped in a [`LazyEncoder`]: nothing touches the
/// network until the first encode call.
#[inline]
pub fn encoder_from_config(config: &Config) -> Result<Arc<dyn Encoder>> {
    match config.encoder.backend {
        EncoderBackend::Ollama => {
            config.ollama.validate()?;
            let ollama = config.ollama.clone();
            let encoder = LazyEncoder::new(
                ollama.model.clone(),
                ollama.embedding_dimension as usize,
                move || {
                    OllamaClient::new(&ollama)?
                        .with_timeout(Duration::from_secs(ollama.timeout_secs))
                        .with_retry_attempts(ollama.retry_attempts)
                        .connect()
                },
            );
            Ok(Arc::new(encoder))
        }
        EncoderBackend::Hashed => {
            config.hashed.validate()?;
            Ok(Arc::new(HashedEncoder::new(
                config.hashed.dimension as usize,
            )?))
        }
    }
}
