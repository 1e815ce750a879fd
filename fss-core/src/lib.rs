//! fss core library — domain types, directory registry, configuration file.
//!
//! Public API surface:
//! - [`types`] — sync entries, tasks, operations, report statuses
//! - [`error`] — [`RegistryError`], [`ConfigError`]
//! - [`registry`] — in-memory [`DirectoryRegistry`]
//! - [`config`] — `source target` pair file parsing

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{load_config, parse_config, DirectoryPair, SkippedLine, SyncConfig};
pub use error::{ConfigError, RegistryError};
pub use registry::{DirectoryRegistry, Registration};
pub use types::{Operation, ReportStatus, SyncEntry, SyncTask, TaskFile, ALL_FILES};
