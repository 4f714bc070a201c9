//! Error types for polyrun-core.
//!
//! These cover failures of the engine itself (filesystem, toolchain setup).
//! Failures of user code are not errors; they are reported through
//! [`ExecutionOutcome`](crate::execute::ExecutionOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// Result type for polyrun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in polyrun-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Language name not recognised.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Workspace could not be created or written.
    #[error("workspace error at {path}: {message}")]
    Workspace { path: PathBuf, message: String },
}

impl Error {
    /// Build a workspace error from an IO failure on `path`.
    pub(crate) fn workspace(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
