//! Watch table: one non-recursive filesystem watch per monitored source.
//!
//! Each watch gets an opaque [`WatchId`] and every raw event from that watch
//! is tagged with it before it reaches the control loop. The table maps ids
//! back to source directories; an event whose id is no longer in the table
//! (the source was cancelled after the event was queued) resolves to nothing.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A raw notification tagged with the watch that produced it.
#[derive(Debug)]
pub struct RawChange {
    pub watch: WatchId,
    pub event: notify::Result<Event>,
}

pub struct WatchBinding {
    source: PathBuf,
    // Backends may report resolved paths (FSEvents reports /private/var/...),
    // so children are matched against both spellings.
    canonical: PathBuf,
    _watcher: Option<RecommendedWatcher>,
}

impl WatchBinding {
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Whether `dir` names the watched directory itself.
    pub fn is_watched_dir(&self, dir: &Path) -> bool {
        dir == self.source || dir == self.canonical
    }
}

pub struct WatchTable {
    next_id: u64,
    bindings: HashMap<WatchId, WatchBinding>,
    by_source: HashMap<PathBuf, WatchId>,
    changes: UnboundedSender<RawChange>,
}

impl WatchTable {
    pub fn new(changes: UnboundedSender<RawChange>) -> Self {
        Self {
            next_id: 1,
            bindings: HashMap::new(),
            by_source: HashMap::new(),
            changes,
        }
    }

    /// Watch the direct children of `source`. Watching an already-watched
    /// source returns its existing id.
    pub fn watch(&mut self, source: &Path) -> Result<WatchId, DaemonError> {
        if let Some(id) = self.by_source.get(source) {
            return Ok(*id);
        }

        let id = self.allocate();
        let tx = self.changes.clone();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = tx.send(RawChange { watch: id, event });
        })?;
        watcher.watch(source, RecursiveMode::NonRecursive)?;

        tracing::debug!(source = %source.display(), watch = %id, "watch established");
        self.insert(id, source, Some(watcher));
        Ok(id)
    }

    /// Stop watching `source`. Dropping the watcher releases the OS handle.
    pub fn unwatch(&mut self, source: &Path) -> Option<WatchId> {
        let id = self.by_source.remove(source)?;
        self.bindings.remove(&id);
        tracing::debug!(source = %source.display(), watch = %id, "watch removed");
        Some(id)
    }

    pub fn resolve(&self, id: WatchId) -> Option<&WatchBinding> {
        self.bindings.get(&id)
    }

    pub fn watch_for(&self, source: &Path) -> Option<WatchId> {
        self.by_source.get(source).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every watch.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.by_source.clear();
    }

    /// Register a binding with no backing watcher so tests can inject events.
    #[cfg(test)]
    pub(crate) fn bind_detached(&mut self, source: &Path) -> WatchId {
        let id = self.allocate();
        self.insert(id, source, None);
        id
    }

    fn allocate(&mut self) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, id: WatchId, source: &Path, watcher: Option<RecommendedWatcher>) {
        let canonical = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        self.bindings.insert(
            id,
            WatchBinding {
                source: source.to_path_buf(),
                canonical,
                _watcher: watcher,
            },
        );
        self.by_source.insert(source.to_path_buf(), id);
    }
}
