//! In-memory directory registry.
//!
//! One [`SyncEntry`] per source path, backed by a hash index on the path.
//! Entries are never removed while the process runs: cancellation clears the
//! `active` flag so `status` can still report history.
//!
//! Path keys are compared component-wise (`/a/b/` and `/a/b` are the same
//! key); no canonicalisation is performed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::types::{ReportStatus, SyncEntry};

/// Outcome of a successful [`DirectoryRegistry::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new entry was created.
    Inserted,
    /// A cancelled entry was switched back on (target possibly replaced).
    Reactivated,
    /// The source is already active with the same target; nothing changed.
    AlreadyActive,
}

#[derive(Debug, Default)]
pub struct DirectoryRegistry {
    entries: HashMap<PathBuf, SyncEntry>,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source -> target`.
    ///
    /// Returns [`RegistryError::DuplicateEntry`] if `source` is active with a
    /// different target. Reactivating a cancelled entry keeps its last-sync
    /// time and error count.
    pub fn register(
        &mut self,
        source: PathBuf,
        target: PathBuf,
    ) -> Result<Registration, RegistryError> {
        match self.entries.get_mut(&source) {
            Some(entry) if entry.active && entry.target == target => {
                Ok(Registration::AlreadyActive)
            }
            Some(entry) if entry.active => Err(RegistryError::DuplicateEntry {
                dir: source,
                existing: entry.target.clone(),
            }),
            Some(entry) => {
                entry.target = target;
                entry.active = true;
                Ok(Registration::Reactivated)
            }
            None => {
                self.entries
                    .insert(source.clone(), SyncEntry::new(source, target));
                Ok(Registration::Inserted)
            }
        }
    }

    pub fn lookup(&self, source: &Path) -> Option<&SyncEntry> {
        self.entries.get(source)
    }

    /// The entry for `source` if it is currently monitored.
    pub fn active(&self, source: &Path) -> Option<&SyncEntry> {
        self.lookup(source).filter(|entry| entry.active)
    }

    /// Clear the active flag. Returns `true` only if the entry was active.
    pub fn deactivate(&mut self, source: &Path) -> bool {
        match self.entries.get_mut(source) {
            Some(entry) if entry.active => {
                entry.active = false;
                true
            }
            _ => false,
        }
    }

    /// Record a worker completion for `source`.
    ///
    /// The timestamp is always updated; the error count only moves on a
    /// failure status. Returns `false` if `source` has no entry.
    pub fn record_completion(
        &mut self,
        source: &Path,
        status: ReportStatus,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(source) else {
            return false;
        };
        entry.last_sync_time = Some(at);
        if status.is_failure() {
            entry.error_count += 1;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
