//! FNV-1a character n-gram feature hashing.
//!
//! Deterministic and offline. Lexical overlap only, so it will not match
//! paraphrases the way a sentence-embedding model does.


use super::{Embedding, Encoder};
use crate::{FaqError, Result};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Inclusive character n-gram lengths hashed into each vector. Fixed, so that
/// [`model_id`] identifies every vector this encoder can produce.
pub const NGRAM_RANGE: (usize, usize) = (1, 3);

#[inline]
pub fn model_id(dimension: u32) -> String {
    format!("fnv1a-ngram-{}", dimension)
}

#[derive(Debug, Clone)]
pub struct HashedEncoder {
    dimension: usize,
    model_id: String,
}

impl HashedEncoder {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(FaqError::Embedding(
                "hashed encoder dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            model_id: model_id(dimension as u32),
        })
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for n in NGRAM_RANGE.0..=NGRAM_RANGE.1 {
            if n > chars.len() {
                continue;
            }
            for window in chars.windows(n) {
                let ngram: String = window.iter().collect();
                let h = fnv1a(ngram.as_bytes());
                let bucket = (h % self.dimension as u64) as usize;
                let sign = if (h >> 32) & 1 == 0 { 1.0f32 } else { -1.0f32 };
                vector[bucket] += sign;
            }
        }

        vector
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl Encoder for HashedEncoder {
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
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
