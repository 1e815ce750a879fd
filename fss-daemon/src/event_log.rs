//! Append-only, human-readable event log.
//!
//! Every line is prefixed with a local timestamp in `[YYYY-MM-DD HH:MM:SS]`
//! form. Worker lifecycle lines use the bracketed layout
//!
//! ```text
//! [ts] [source] [target] [worker-id] [OPERATION] [STARTED] [File: name]
//! [ts] [source] [target] [worker-id] [OPERATION] [STATUS] [details]
//! ```
//!
//! The log is shared between the control loop and the scheduler, so handles
//! are cheap clones over one sink. Writes are flushed immediately; a failed
//! write is reported through `tracing` and otherwise ignored.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use fss_core::SyncTask;

use crate::error::{io_err, DaemonError};

#[derive(Debug)]
enum Sink {
    File { path: PathBuf, file: File },
    Memory(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct EventLog {
    sink: Arc<Mutex<Sink>>,
}

impl EventLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, DaemonError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        Ok(Self::with_sink(Sink::File {
            path: path.to_path_buf(),
            file,
        }))
    }

    /// A log that keeps lines in memory; used by tests and embedders.
    pub fn in_memory() -> Self {
        Self::with_sink(Sink::Memory(Vec::new()))
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Append one timestamped line and return it.
    pub fn record(&self, message: impl AsRef<str>) -> String {
        let line = stamp(message.as_ref());
        tracing::info!("{}", message.as_ref());

        let mut sink = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &mut *sink {
            Sink::File { path, file } => {
                if let Err(err) = writeln!(file, "{line}").and_then(|()| file.flush()) {
                    tracing::warn!(path = %path.display(), error = %err, "event log write failed");
                }
            }
            Sink::Memory(lines) => lines.push(line.clone()),
        }
        line
    }

    /// `[src] [dst] [id] [OP] [STARTED] [File: name]`
    pub fn worker_started(&self, task: &SyncTask, worker: impl std::fmt::Display) -> String {
        self.record(format!(
            "[{}] [{}] [{}] [{}] [STARTED] [File: {}]",
            task.source.display(),
            task.target.display(),
            worker,
            task.operation,
            task.file
        ))
    }

    /// `[src] [dst] [id] [OP] [STATUS] [details]`
    pub fn worker_finished(
        &self,
        task: &SyncTask,
        worker: impl std::fmt::Display,
        status: impl std::fmt::Display,
        details: &str,
    ) -> String {
        self.record(format!(
            "[{}] [{}] [{}] [{}] [{}] [{}]",
            task.source.display(),
            task.target.display(),
            worker,
            task.operation,
            status,
            details
        ))
    }

    /// Lines written so far. Empty for file-backed logs.
    pub fn lines(&self) -> Vec<String> {
        let sink = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*sink {
            Sink::Memory(lines) => lines.clone(),
            Sink::File { .. } => Vec::new(),
        }
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

pub fn timestamp() -> String {
    Local::now().format("[%Y-%m-%d %H:%M:%S]").to_string()
}

/// Prefix `message` with the current timestamp.
pub fn stamp(message: &str) -> String {
    format!("{} {message}", timestamp())
}
