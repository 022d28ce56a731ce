//! Error types for ragchat

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ragchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in retrieval operations
#[derive(Error, Debug)]
pub enum Error {
    /// The embedding backend is unavailable or rejected the input
    #[error("embedding error: {0}")]
    Embedding(String),

    /// No index file exists at the given path
    #[error("index not found: {}", .0.display())]
    IndexNotFound(PathBuf),

    /// Reading or writing a persisted artifact failed, or the file is corrupt
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The index and the document records of a session disagree
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A vector does not have the dimension of the index it targets
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be read or parsed
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn persistence(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Error::Persistence(format!("{}: {err}", path.display()))
    }
}
