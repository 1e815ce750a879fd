//! Error types for fss-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`crate::registry::DirectoryRegistry`] mutations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The source is already actively monitored with a different target.
    #[error("{dir} is already monitored with target {existing}")]
    DuplicateEntry { dir: PathBuf, existing: PathBuf },
}

/// Errors raised while loading the directory-pair configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// Any other I/O failure while reading the file.
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
