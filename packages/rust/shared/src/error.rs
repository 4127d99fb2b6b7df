//! Error types for vocabsync.
//!
//! Library crates use [`VocabError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-vocabulary failures that end up in the ledger are modelled separately
//! by [`crate::JobError`]; the pipeline classifies a `VocabError` into a
//! `JobError` at each stage boundary.

use std::path::PathBuf;

/// Top-level error type for all vocabsync library operations.
#[derive(Debug, thiserror::Error)]
pub enum VocabError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A remote endpoint answered with an unexpected status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// RDF parsing or serialization error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// No base namespace could be inferred from a graph.
    #[error("no namespace detected: {0}")]
    NoNamespace(String),

    /// SKOS structural repair failed.
    #[error("skosify error: {0}")]
    Skosify(String),

    /// Compressed payload could not be unpacked or decoded.
    #[error("archive error: {0}")]
    Archive(String),

    /// Ledger database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (contract violation, malformed input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VocabError>;

impl VocabError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
