//! Error types for reposcope-index.

use std::path::PathBuf;

/// Errors that can occur while chunking, indexing or persisting.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding request failed.
    #[error("LLM error: {0}")]
    Llm(#[from] reposcope_llm::LlmError),

    /// A vector's length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Writing the index snapshot failed.
    #[error("failed to persist index to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot parsed but its contents are inconsistent.
    #[error("corrupt index snapshot: {0}")]
    CorruptSnapshot(String),

    /// Work was cancelled before the file finished.
    #[error("cancelled")]
    Cancelled,

    /// `git clone` failed.
    #[error("git clone failed: {0}")]
    Clone(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
