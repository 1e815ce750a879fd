//! Copy, delete and full-directory sync.
//!
//! ## Copy protocol
//!
//! 1. Check the source entry is a regular file.
//! 2. Ensure the target directory exists.
//! 3. Copy into `.<name>.fss-tmp` beside the final path.
//! 4. Rename over the final path (atomic on POSIX).
//!
//! Only direct children of the source directory are ever touched.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use fss_core::{Operation, SyncTask, TaskFile};

use crate::error::{io_err, WorkerError};
use crate::report::WorkerReport;

/// Suffix of the hidden sibling a copy is staged in before the final rename.
pub const TMP_SUFFIX: &str = ".fss-tmp";

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run a task described by the four positional worker arguments.
///
/// An unrecognised operation tag yields an `ERROR` report without any I/O.
pub fn execute_args(source: &str, target: &str, file: &str, operation: &str) -> WorkerReport {
    match operation.parse::<Operation>() {
        Ok(operation) => execute(&SyncTask {
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            file: TaskFile::from_arg(file),
            operation,
        }),
        Err(tag) => {
            let err = WorkerError::UnknownOperation(tag);
            tracing::error!("{err}");
            WorkerReport::error(err.to_string())
        }
    }
}

/// Run one task to completion and summarise it as a report.
pub fn execute(task: &SyncTask) -> WorkerReport {
    match task.operation {
        Operation::Full => full_sync(&task.source, &task.target),
        Operation::Added | Operation::Modified => {
            match single_file(task).and_then(|name| copy_named(&task.source, &task.target, name))
            {
                Ok(name) => WorkerReport::success(format!("File {name} was copied")),
                Err(err) => {
                    tracing::error!("{err}");
                    WorkerReport::error(err.to_string())
                }
            }
        }
        Operation::Deleted => {
            match single_file(task).and_then(|name| delete_named(&task.target, name)) {
                Ok((name, true)) => WorkerReport::success(format!("File {name} was deleted")),
                Ok((name, false)) => WorkerReport::success(format!("File {name} already absent")),
                Err(err) => {
                    tracing::error!("{err}");
                    WorkerReport::error(err.to_string())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Full sync
// ---------------------------------------------------------------------------

/// Per-entry tallies of a FULL run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullSyncCounts {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl FullSyncCounts {
    pub fn into_report(self) -> WorkerReport {
        if self.errors == 0 {
            WorkerReport::success(format!("{} files processed", self.processed))
        } else if self.processed > 0 {
            WorkerReport::partial(format!(
                "{} files copied, {} skipped, {} errors",
                self.processed, self.skipped, self.errors
            ))
        } else {
            WorkerReport::error(format!("Operation failed: {} errors", self.errors))
        }
    }
}

fn full_sync(source: &Path, target: &Path) -> WorkerReport {
    let entries = match fs::read_dir(source) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!("cannot open source directory {}: {err}", source.display());
            return WorkerReport::error(format!(
                "Cannot open source directory {}: {err}",
                source.display()
            ));
        }
    };

    if let Err(err) = ensure_dir(target) {
        tracing::error!("{err}");
        return WorkerReport::error(format!(
            "Cannot create target directory {}: {err}",
            target.display()
        ));
    }

    let mut counts = FullSyncCounts::default();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("cannot read entry in {}: {err}", source.display());
                counts.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        // Follow symlinks, so a link to a regular file is copied as a file.
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!("cannot stat {}: {err}", path.display());
                counts.errors += 1;
                continue;
            }
        };
        if !meta.is_file() {
            tracing::debug!("skipping non-regular entry {}", path.display());
            counts.skipped += 1;
            continue;
        }

        let name = entry.file_name();
        match copy_file(&path, target, &name) {
            Ok(()) => counts.processed += 1,
            Err(err) => {
                tracing::warn!("{err}");
                counts.errors += 1;
            }
        }
    }

    tracing::info!(
        "full sync {} -> {}: {} processed, {} skipped, {} errors",
        source.display(),
        target.display(),
        counts.processed,
        counts.skipped,
        counts.errors
    );
    counts.into_report()
}

// ---------------------------------------------------------------------------
// Single-file operations
// ---------------------------------------------------------------------------

fn single_file(task: &SyncTask) -> Result<&str, WorkerError> {
    let name = task.file.name().ok_or_else(|| WorkerError::MissingFileName {
        operation: task.operation.to_string(),
    })?;
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(WorkerError::InvalidFileName {
            name: name.to_string(),
        }),
    }
}

fn copy_named<'a>(source: &Path, target: &Path, name: &'a str) -> Result<&'a str, WorkerError> {
    let from = source.join(name);
    let meta = fs::metadata(&from).map_err(|e| io_err(&from, e))?;
    if !meta.is_file() {
        return Err(WorkerError::NotRegularFile { path: from });
    }
    ensure_dir(target)?;
    copy_file(&from, target, OsStr::new(name))?;
    tracing::info!("copied {} to {}", from.display(), target.display());
    Ok(name)
}

/// Remove `target/name`. Returns `false` when the file was already gone.
fn delete_named<'a>(target: &Path, name: &'a str) -> Result<(&'a str, bool), WorkerError> {
    let path = target.join(name);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!("deleted {}", path.display());
            Ok((name, true))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok((name, false)),
        Err(err) => Err(io_err(&path, err)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn copy_file(from: &Path, target_dir: &Path, name: &OsStr) -> Result<(), WorkerError> {
    let dest = target_dir.join(name);
    let mut tmp_name = OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(TMP_SUFFIX);
    let tmp = target_dir.join(tmp_name);

    if let Err(err) = fs::copy(from, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(from, err));
    }
    if let Err(err) = fs::rename(&tmp, &dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(&dest, err));
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), WorkerError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
