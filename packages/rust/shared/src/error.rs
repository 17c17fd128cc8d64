//! Error types for the synthesizer.
//!
//! Library crates use [`SynthError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all synthesizer operations.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Configuration loading or validation error (missing template, missing credential).
    #[error("config error: {message}")]
    Config { message: String },

    /// LLM backend error (transport, auth, timeout, or response decoding).
    #[error("backend error: {0}")]
    Backend(String),

    /// A single uploaded document could not be read.
    #[error("error reading {file}: {message}")]
    Extraction { file: String, message: String },

    /// The uploaded document has an extension we cannot extract.
    #[error("unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    /// Template file missing or unreadable.
    #[error("template error: {0}")]
    Template(String),

    /// Knowledge base load/persist error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The change-request key is already present in the knowledge base.
    #[error("change request '{key}' already exists in the knowledge base")]
    Conflict { key: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// User input error (empty required documents, blank instruction, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Document export error.
    #[error("export error: {0}")]
    Export(String),

    /// An orchestrator action was requested in a state that does not accept it.
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SynthError>;

impl SynthError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an extraction error for the named file.
    pub fn extraction(file: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            file: file.into(),
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

    /// True for the recoverable store-conflict branch.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
