//! Error types for fss-worker.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong inside a single worker invocation.
///
/// These never cross the process boundary as values: the executor folds them
/// into the report's `STATUS`/`DETAILS` pair.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The named source entry exists but is not a regular file.
    #[error("{path} is not a regular file")]
    NotRegularFile { path: PathBuf },

    /// The file name is not a single plain path component.
    #[error("invalid file name {name:?}")]
    InvalidFileName { name: String },

    /// A single-file operation was given the `ALL` sentinel.
    #[error("{operation} requires a file name")]
    MissingFileName { operation: String },

    /// The operation tag is not one of FULL, ADDED, MODIFIED, DELETED.
    #[error("Unknown operation {0}")]
    UnknownOperation(String),
}

/// Convenience constructor for [`WorkerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WorkerError {
    WorkerError::Io {
        path: path.into(),
        source,
    }
}
