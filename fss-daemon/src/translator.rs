//! Turns raw filesystem notifications into single-file [`SyncTask`]s.
//!
//! Classification by event kind:
//!
//! | notify kind                    | operation                            |
//! |--------------------------------|--------------------------------------|
//! | `Create(_)`                    | ADDED                                |
//! | `Modify(Name(To))`             | ADDED                                |
//! | `Modify(Name(From))`           | DELETED                              |
//! | `Modify(Name(Both))`           | DELETED old name, ADDED new name     |
//! | `Modify(Name(_))` otherwise    | ADDED if the path exists, else DELETED |
//! | `Modify(Metadata(_))`          | ignored                              |
//! | `Modify(_)` otherwise          | MODIFIED                             |
//! | `Remove(_)`                    | DELETED                              |
//! | `Access`, `Any`, `Other`       | ignored                              |
//!
//! Only direct children of the watched directory produce tasks; events on
//! the directory itself or on deeper paths are dropped, as are the staging
//! files a worker writes before its final rename.

use std::path::Path;

use fss_core::{DirectoryRegistry, Operation, SyncTask};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::watch::{RawChange, WatchBinding, WatchTable};

/// Map one notification to `(operation, path)` pairs.
pub fn classify(event: &Event) -> Vec<(Operation, &Path)> {
    match &event.kind {
        EventKind::Create(_) => tag(event, Operation::Added),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => tag(event, Operation::Added),
            RenameMode::From => tag(event, Operation::Deleted),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    out.push((Operation::Deleted, from.as_path()));
                }
                if let Some(to) = event.paths.get(1) {
                    out.push((Operation::Added, to.as_path()));
                }
                out
            }
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let op = if p.exists() {
                        Operation::Added
                    } else {
                        Operation::Deleted
                    };
                    (op, p.as_path())
                })
                .collect(),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => tag(event, Operation::Modified),
        EventKind::Remove(_) => tag(event, Operation::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn tag(event: &Event, operation: Operation) -> Vec<(Operation, &Path)> {
    event.paths.iter().map(|p| (operation, p.as_path())).collect()
}

/// Build the tasks for one raw change.
///
/// Changes from unknown watches or for inactive sources yield nothing.
pub fn translate(
    change: &RawChange,
    watches: &WatchTable,
    registry: &DirectoryRegistry,
) -> Vec<SyncTask> {
    let event = match &change.event {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(watch = %change.watch, error = %err, "watcher reported an error");
            return Vec::new();
        }
    };

    let Some(binding) = watches.resolve(change.watch) else {
        tracing::warn!(watch = %change.watch, "change for unknown watch discarded");
        return Vec::new();
    };
    let Some(entry) = registry.active(binding.source()) else {
        tracing::debug!(source = %binding.source().display(), "change for inactive source discarded");
        return Vec::new();
    };

    classify(event)
        .into_iter()
        .filter_map(|(operation, path)| {
            let name = child_name(binding, path)?;
            Some(SyncTask::for_file(
                binding.source(),
                &entry.target,
                name,
                operation,
            ))
        })
        .collect()
}

fn child_name(binding: &WatchBinding, path: &Path) -> Option<String> {
    let parent = path.parent()?;
    if !binding.is_watched_dir(parent) {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    if name.ends_with(fss_worker::TMP_SUFFIX) {
        return None;
    }
    Some(name.into_owned())
}
