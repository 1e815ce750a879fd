//! Domain types shared by the manager and the worker.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Filename sentinel meaning "synchronize the entire directory".
pub const ALL_FILES: &str = "ALL";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of work a [`SyncTask`] asks a worker to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Full,
    Added,
    Modified,
    Deleted,
}

impl Operation {
    /// The wire tag passed to workers and written to the event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Full => "FULL",
            Operation::Added => "ADDED",
            Operation::Modified => "MODIFIED",
            Operation::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL" => Ok(Operation::Full),
            "ADDED" => Ok(Operation::Added),
            "MODIFIED" => Ok(Operation::Modified),
            "DELETED" => Ok(Operation::Deleted),
            other => Err(other.to_string()),
        }
    }
}

/// Outcome reported by a worker, as parsed by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportStatus {
    Success,
    Partial,
    Error,
    /// No report, a truncated report, or an unrecognised status value.
    #[default]
    Unknown,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Success => "SUCCESS",
            ReportStatus::Partial => "PARTIAL",
            ReportStatus::Error => "ERROR",
            ReportStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether a completion with this status counts against the entry's error
    /// count. Only an explicit ERROR report does; PARTIAL and UNKNOWN do not.
    pub fn is_failure(&self) -> bool {
        matches!(self, ReportStatus::Error)
    }

    /// Parse a status token; anything unrecognised maps to [`ReportStatus::Unknown`].
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "SUCCESS" => ReportStatus::Success,
            "PARTIAL" => ReportStatus::Partial,
            "ERROR" => ReportStatus::Error,
            _ => ReportStatus::Unknown,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The filename slot of a task: one named direct child, or the whole directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskFile {
    All,
    Named(String),
}

impl TaskFile {
    /// Interpret a positional worker argument. `ALL` is always the sentinel.
    pub fn from_arg(arg: &str) -> Self {
        if arg == ALL_FILES {
            TaskFile::All
        } else {
            TaskFile::Named(arg.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TaskFile::All => None,
            TaskFile::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for TaskFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFile::All => f.write_str(ALL_FILES),
            TaskFile::Named(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One registered source directory and its synchronization history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub active: bool,
    /// `None` until the first completion is recorded.
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error_count: u64,
}

impl SyncEntry {
    pub fn new(source: PathBuf, target: PathBuf) -> Self {
        Self {
            source,
            target,
            active: true,
            last_sync_time: None,
            error_count: 0,
        }
    }
}

/// An immutable unit of synchronization work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub source: PathBuf,
    pub target: PathBuf,
    pub file: TaskFile,
    pub operation: Operation,
}

impl SyncTask {
    /// A FULL task covering every direct child of `source`.
    pub fn full(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            file: TaskFile::All,
            operation: Operation::Full,
        }
    }

    /// A single-file task (ADDED, MODIFIED or DELETED).
    pub fn for_file(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        name: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            file: TaskFile::Named(name.into()),
            operation,
        }
    }

    pub fn is_for(&self, source: &Path) -> bool {
        self.source == source
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
