//! Error types for Autograph.
//!
//! Library crates use [`AutographError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Autograph operations.
#[derive(Debug, thiserror::Error)]
pub enum AutographError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Rejected input (empty source list, unknown id, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Persisted data that cannot be decoded into its typed shape.
    #[error("data error: {message}")]
    Data { message: String },

    /// A snapshot build step failed; the build transaction was rolled back.
    #[error("build step `{step}` failed: {source}")]
    BuildStep {
        step: &'static str,
        source: Box<AutographError>,
    },

    /// The build was cancelled and its transaction rolled back.
    #[error("build cancelled")]
    Cancelled,

    /// Export table serialization error.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AutographError>;

impl AutographError {
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

    /// Create a data error from any displayable message.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data {
            message: msg.into(),
        }
    }

    /// Wrap an error with the name of the build step it came from.
    pub fn in_step(step: &'static str, source: AutographError) -> Self {
        Self::BuildStep {
            step,
            source: Box::new(source),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through build step wrappers.
    pub fn root(&self) -> &AutographError {
        match self {
            Self::BuildStep { source, .. } => source.root(),
            other => other,
        }
    }
}
