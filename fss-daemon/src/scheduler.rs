//! Bounded worker pool with a FIFO overflow queue.
//!
//! At most `ceiling` workers run at once and at most one of them works on
//! any given source directory. A task for a source that already has a
//! worker is discarded at submission. A task that finds the pool full is
//! appended to the queue; every completion promotes queued tasks in
//! arrival order until a worker starts or the queue is exhausted.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use fss_core::{DirectoryRegistry, ReportStatus, SyncTask};
use fss_worker::WorkerReport;

use crate::event_log::EventLog;
use crate::launcher::{Launched, WorkerExit, WorkerId, WorkerLauncher};

/// A worker currently running on behalf of a task.
#[derive(Debug, Clone)]
pub struct ActiveWorker {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub task: SyncTask,
    pub started_at: DateTime<Utc>,
}

/// What happened to a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started(WorkerId),
    Queued,
    /// The source already had a worker, or the pool is draining.
    Discarded,
    /// The launcher refused; recorded as an ERROR completion.
    Failed,
}

/// A finished worker with its parsed report.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: WorkerId,
    pub task: SyncTask,
    pub report: WorkerReport,
}

pub struct Scheduler {
    ceiling: usize,
    active: HashMap<WorkerId, ActiveWorker>,
    queue: VecDeque<SyncTask>,
    launcher: Box<dyn WorkerLauncher>,
    log: EventLog,
    draining: bool,
}

impl Scheduler {
    /// A ceiling of zero is treated as one.
    pub fn new(ceiling: usize, launcher: Box<dyn WorkerLauncher>, log: EventLog) -> Self {
        Self {
            ceiling: ceiling.max(1),
            active: HashMap::new(),
            queue: VecDeque::new(),
            launcher,
            log,
            draining: false,
        }
    }

    pub fn submit(&mut self, task: SyncTask, registry: &mut DirectoryRegistry) -> Submission {
        if self.draining {
            tracing::debug!(source = %task.source.display(), "pool draining, task discarded");
            return Submission::Discarded;
        }
        // Waiting tasks go first if a slot is free.
        self.promote(registry);

        if self.is_busy(&task.source) {
            tracing::debug!(
                source = %task.source.display(),
                operation = %task.operation,
                file = %task.file,
                "source busy, task discarded"
            );
            return Submission::Discarded;
        }
        if self.active.len() < self.ceiling {
            return self.start(task, registry);
        }

        self.log.record(format!(
            "Queued task: {} -> {} ({} {})",
            task.source.display(),
            task.target.display(),
            task.operation,
            task.file
        ));
        self.queue.push_back(task);
        Submission::Queued
    }

    /// Handle a worker exit. Unknown ids are ignored.
    pub fn complete(
        &mut self,
        exit: WorkerExit,
        registry: &mut DirectoryRegistry,
    ) -> Option<Completion> {
        let Some(worker) = self.active.remove(&exit.id) else {
            tracing::debug!(worker = exit.id, "exit for unknown worker ignored");
            return None;
        };

        let report = WorkerReport::parse(&exit.output);
        registry.record_completion(&worker.task.source, report.status, Utc::now());
        self.log.worker_finished(
            &worker.task,
            worker.pid.unwrap_or(worker.id),
            report.status,
            &report.details,
        );
        tracing::debug!(
            worker = worker.id,
            elapsed_ms = (Utc::now() - worker.started_at).num_milliseconds(),
            status = %report.status,
            "worker finished"
        );

        self.promote(registry);

        Some(Completion {
            id: worker.id,
            task: worker.task,
            report,
        })
    }

    pub fn is_busy(&self, source: &Path) -> bool {
        self.active.values().any(|worker| worker.task.is_for(source))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Active workers ordered by id.
    pub fn active_workers(&self) -> Vec<&ActiveWorker> {
        let mut workers: Vec<&ActiveWorker> = self.active.values().collect();
        workers.sort_by_key(|worker| worker.id);
        workers
    }

    /// Queued tasks, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &SyncTask> {
        self.queue.iter()
    }

    /// Stop starting new work. Running workers are left alone.
    pub fn begin_drain(&mut self) {
        self.draining = true;
    }

    /// Drop every queued task, returning how many were dropped.
    pub fn discard_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    fn promote(&mut self, registry: &mut DirectoryRegistry) {
        while !self.draining && self.active.len() < self.ceiling {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if self.is_busy(&task.source) {
                tracing::debug!(source = %task.source.display(), "queued task dropped, source busy");
                continue;
            }
            self.start(task, registry);
        }
    }

    fn start(&mut self, task: SyncTask, registry: &mut DirectoryRegistry) -> Submission {
        match self.launcher.launch(&task) {
            // The running holder of this id keeps it; an exit carrying the id
            // can only be matched to one worker.
            Ok(Launched { id, .. }) if self.active.contains_key(&id) => {
                tracing::error!(
                    worker = id,
                    source = %task.source.display(),
                    "launcher reused an active worker id"
                );
                self.fail(&task, &format!("worker id {id} already in use"), registry)
            }
            Ok(launched) => {
                let Launched { id, pid } = launched;
                self.log.worker_started(&task, launched.log_identity());
                self.active.insert(
                    id,
                    ActiveWorker {
                        id,
                        pid,
                        task,
                        started_at: Utc::now(),
                    },
                );
                Submission::Started(id)
            }
            Err(err) => {
                tracing::error!(source = %task.source.display(), error = %err, "worker launch failed");
                self.fail(&task, &err.to_string(), registry)
            }
        }
    }

    fn fail(
        &mut self,
        task: &SyncTask,
        details: &str,
        registry: &mut DirectoryRegistry,
    ) -> Submission {
        registry.record_completion(&task.source, ReportStatus::Error, Utc::now());
        self.log.worker_finished(task, 0, ReportStatus::Error, details);
        Submission::Failed
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
