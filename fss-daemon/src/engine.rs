//! Manager state and the handlers the control loop dispatches to.
//!
//! The engine owns the registry, the watch table and the scheduler. It is
//! driven from a single task, so none of its state needs locking: commands,
//! filesystem changes and worker exits are all applied one at a time.

use std::fs;
use std::path::Path;

use chrono::Local;
use fss_core::{DirectoryRegistry, Registration, SyncConfig, SyncTask};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::event_log::{stamp, EventLog};
use crate::launcher::WorkerExit;
use crate::protocol::Command;
use crate::scheduler::{Completion, Scheduler};
use crate::translator;
use crate::watch::{RawChange, WatchTable};

/// Response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The manager must drain and stop. Carries the lines sent before the drain.
    Shutdown(String),
}

pub struct Engine {
    registry: DirectoryRegistry,
    watches: WatchTable,
    scheduler: Scheduler,
    log: EventLog,
}

impl Engine {
    pub fn new(watches: WatchTable, scheduler: Scheduler, log: EventLog) -> Self {
        Self {
            registry: DirectoryRegistry::new(),
            watches,
            scheduler,
            log,
        }
    }

    /// Register every configured pair as if it had been `add`ed.
    pub fn bootstrap(&mut self, config: &SyncConfig) {
        for skipped in &config.skipped {
            tracing::warn!(
                line = skipped.line,
                content = %skipped.content,
                "config line skipped, expected `source target`"
            );
        }
        for pair in &config.pairs {
            self.add(&pair.source, &pair.target);
        }
        tracing::info!(
            pairs = config.pairs.len(),
            watched = self.watches.len(),
            "configuration loaded"
        );
    }

    pub fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Add { source, target } => Reply::Text(self.add(&source, &target)),
            Command::Cancel { source } => Reply::Text(self.cancel(&source)),
            Command::Status { source } => Reply::Text(self.status(&source)),
            Command::Sync { source } => Reply::Text(self.sync(&source)),
            Command::Shutdown => Reply::Shutdown(self.shutdown_notice()),
            Command::Unrecognized(line) => {
                tracing::warn!(command = %line, "unrecognized command");
                Reply::Text(stamp(&format!("Unrecognized command: {line}")))
            }
        }
    }

    pub fn handle_change(&mut self, change: RawChange) {
        for task in translator::translate(&change, &self.watches, &self.registry) {
            self.scheduler.submit(task, &mut self.registry);
        }
    }

    pub fn handle_exit(&mut self, exit: WorkerExit) -> Option<Completion> {
        self.scheduler.complete(exit, &mut self.registry)
    }

    /// Wait for every running worker, then drop whatever is still queued.
    ///
    /// Blocks the control loop for as long as the slowest worker takes.
    pub async fn shutdown(&mut self, exits: &mut UnboundedReceiver<WorkerExit>) -> String {
        self.scheduler.begin_drain();
        while self.scheduler.active_count() > 0 {
            match exits.recv().await {
                Some(exit) => {
                    self.handle_exit(exit);
                }
                None => {
                    tracing::warn!(
                        active = self.scheduler.active_count(),
                        "exit channel closed with workers outstanding"
                    );
                    break;
                }
            }
        }

        let dropped = self.scheduler.discard_queue();
        if dropped > 0 {
            self.log
                .record(format!("Discarded {dropped} queued tasks"));
        }
        self.watches.clear();
        self.log.record("Manager shutdown complete.")
    }

    /// Periodic snapshot of the pool for debugging.
    pub fn housekeeping(&self) {
        tracing::debug!(
            active = self.scheduler.active_count(),
            queued = self.scheduler.queued_count(),
            watched = self.watches.len(),
            entries = self.registry.len(),
            "pool snapshot"
        );
        for (position, task) in self.scheduler.queued().enumerate() {
            tracing::debug!(
                position,
                source = %task.source.display(),
                operation = %task.operation,
                file = %task.file,
                "waiting"
            );
        }
    }

    pub fn registry(&self) -> &DirectoryRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn watches(&self) -> &WatchTable {
        &self.watches
    }

    fn add(&mut self, source: &Path, target: &Path) -> String {
        if same_directory(source, target) {
            return self.log.record(format!(
                "Cannot add {}: source and target are the same directory",
                source.display()
            ));
        }
        if let Some(entry) = self.registry.active(source) {
            if entry.target == target {
                return self
                    .log
                    .record(format!("Already in queue: {}", source.display()));
            }
        }
        if !source.is_dir() {
            return self.log.record(format!(
                "Cannot monitor {}: not a directory",
                source.display()
            ));
        }

        // The watch comes first so a registered active entry always has one.
        if let Err(err) = self.watches.watch(source) {
            return self
                .log
                .record(format!("Cannot monitor {}: {err}", source.display()));
        }

        match self
            .registry
            .register(source.to_path_buf(), target.to_path_buf())
        {
            Ok(Registration::AlreadyActive) => self
                .log
                .record(format!("Already in queue: {}", source.display())),
            Ok(registration) => {
                if let Err(err) = fs::create_dir_all(target) {
                    tracing::warn!(dir = %target.display(), error = %err, "could not create target directory");
                }
                tracing::debug!(source = %source.display(), ?registration, "directory registered");
                let added = self.log.record(format!(
                    "Added directory: {} -> {}",
                    source.display(),
                    target.display()
                ));
                let started = self
                    .log
                    .record(format!("Monitoring started for {}", source.display()));
                self.scheduler
                    .submit(SyncTask::full(source, target), &mut self.registry);
                format!("{added}\n{started}")
            }
            Err(err) => {
                // Active with another target; that entry keeps its watch.
                self.log
                    .record(format!("Cannot add {}: {err}", source.display()))
            }
        }
    }

    fn cancel(&mut self, source: &Path) -> String {
        if self.registry.deactivate(source) {
            self.watches.unwatch(source);
            self.log
                .record(format!("Monitoring stopped for {}", source.display()))
        } else {
            self.log
                .record(format!("Directory not monitored: {}", source.display()))
        }
    }

    fn status(&self, source: &Path) -> String {
        let Some(entry) = self.registry.lookup(source) else {
            return self
                .log
                .record(format!("Directory not monitored: {}", source.display()));
        };

        let requested = self
            .log
            .record(format!("Status requested for {}", source.display()));
        let last_sync = entry
            .last_sync_time
            .map(|at| {
                at.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "Never".to_string());

        format!(
            "{requested}\nDirectory: {}\nTarget: {}\nLast Sync: {last_sync}\nErrors: {}\nStatus: {}",
            entry.source.display(),
            entry.target.display(),
            entry.error_count,
            if entry.active { "Active" } else { "Inactive" }
        )
    }

    fn sync(&mut self, source: &Path) -> String {
        let Some(entry) = self.registry.active(source) else {
            return self
                .log
                .record(format!("Directory not monitored: {}", source.display()));
        };
        if self.scheduler.is_busy(source) {
            return self
                .log
                .record(format!("Sync already in progress {}", source.display()));
        }

        let task = SyncTask::full(source, &entry.target);
        let line = self.log.record(format!(
            "Syncing directory: {} -> {}",
            source.display(),
            entry.target.display()
        ));
        self.scheduler.submit(task, &mut self.registry);
        line
    }

    fn shutdown_notice(&self) -> String {
        [
            "Shutting down manager...",
            "Waiting for all active workers to finish.",
            "Discarding remaining queued tasks.",
        ]
        .iter()
        .map(|line| self.log.record(line))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Paths naming one directory, compared as written and, when both exist,
/// after resolving links.
fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
