//! Error types for docweave.
//!
//! Library crates use [`DocweaveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docweave operations.
#[derive(Debug, thiserror::Error)]
pub enum DocweaveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Well-formedness error in a source or target document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Error reported by the underlying XML reader.
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: usize,
        source: quick_xml::Error,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad pattern, bad target, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Temp-file swap failed; the original document is left untouched.
    #[error("commit failed for {path:?}: {message}")]
    Commit { path: PathBuf, message: String },

    /// A background rewrite task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocweaveError>;

impl DocweaveError {
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

    /// Wrap a reader error together with the byte offset it occurred at.
    pub fn xml(position: usize, source: quick_xml::Error) -> Self {
        Self::Xml { position, source }
    }

    /// Create a commit error for the document at `path`.
    pub fn commit(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Commit {
            path: path.into(),
            message: msg.into(),
        }
    }
}
