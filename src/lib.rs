use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaqError>;

#[derive(Error, Debug)]
pub enum FaqError {
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error("Index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Retrieval engine is not ready: no index has been loaded")]
    EngineNotReady,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Encoder unavailable ({cause}): {message}")]
    EncoderUnavailable {
        cause: UnavailableCause,
        message: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Whether an unavailable encoder is worth retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableCause {
    /// Network trouble, timeouts, server-side failures.
    Transient,
    /// Misconfiguration: bad endpoint, unknown model, rejected request.
    Permanent,
}

impl fmt::Display for UnavailableCause {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

impl FaqError {
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            cause: UnavailableCause::Transient,
            message: message.into(),
        }
    }

    #[inline]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            cause: UnavailableCause::Permanent,
            message: message.into(),
        }
    }

    /// True only for encoder failures a caller may reasonably retry.
    #[inline]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EncoderUnavailable {
                cause: UnavailableCause::Transient,
                ..
            }
        )
    }

    /// Persisted-index failures that a rebuild resolves.
    #[inline]
    pub const fn needs_rebuild(&self) -> bool {
        matches!(self, Self::IndexNotFound(_) | Self::IndexCorrupt(_))
    }
}

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod policy;
