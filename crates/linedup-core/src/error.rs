//! Error types for linedup.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for linedup operations.
pub type Result<T> = std::result::Result<T, DedupError>;

/// Where a storage failure happened.
///
/// Carries enough context (unit keys, round and pair numbers) for a caller to
/// retry from the last good unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSite {
    /// Creating or inspecting the workspace directory.
    Workspace(PathBuf),
    /// Reading the input stream.
    Input,
    /// Writing or exposing the final output.
    Output(PathBuf),
    /// Writing the chunk unit with the given sequence index.
    Chunk { index: usize, key: String },
    /// Merging pair `pair` of round `round`.
    Merge {
        round: usize,
        pair: usize,
        left: String,
        right: String,
    },
    /// Deleting a consumed unit.
    Delete { key: String },
}

impl fmt::Display for FailureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace(path) => write!(f, "workspace {}", path.display()),
            Self::Input => write!(f, "input stream"),
            Self::Output(path) => write!(f, "output {}", path.display()),
            Self::Chunk { index, key } => write!(f, "chunk {index} ({key})"),
            Self::Merge {
                round,
                pair,
                left,
                right,
            } => write!(f, "round {round} pair {pair} ({left} + {right})"),
            Self::Delete { key } => write!(f, "delete of {key}"),
        }
    }
}

/// Errors that can occur in linedup operations.
#[derive(Error, Debug)]
pub enum DedupError {
    /// Bad chunk size, workspace path or other option. Raised before any I/O.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Read/write/delete failure against the workspace or the input/output.
    #[error("Storage failure at {site}: {source}")]
    StorageFailure {
        site: FailureSite,
        #[source]
        source: std::io::Error,
    },

    /// An internal invariant was violated.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input could not be decoded (e.g. a corrupt Parquet file).
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The run was cancelled through its cancel token.
    #[error("Cancelled")]
    Cancelled,
}

impl DedupError {
    /// Build a [`DedupError::StorageFailure`].
    pub fn storage(site: FailureSite, source: std::io::Error) -> Self {
        Self::StorageFailure { site, source }
    }

    /// The failure site, if this is a storage failure.
    #[must_use]
    pub fn site(&self) -> Option<&FailureSite> {
        match self {
            Self::StorageFailure { site, .. } => Some(site),
            _ => None,
        }
    }
}
