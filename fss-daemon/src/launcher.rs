//! Worker launching.
//!
//! A launcher starts one worker per [`SyncTask`] and returns an identifier
//! immediately. When the worker terminates, its captured standard output is
//! delivered on the exit channel as a [`WorkerExit`]; the scheduler never
//! blocks waiting on an individual worker.

use std::path::PathBuf;
use std::process::Stdio;

use fss_core::SyncTask;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::DaemonError;

/// Launcher-assigned worker number. Never an OS pid, which the kernel may
/// hand to another worker before the first one's exit has been processed.
pub type WorkerId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub id: WorkerId,
    /// Everything the worker wrote to standard output.
    pub output: String,
}

/// A worker that has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launched {
    pub id: WorkerId,
    /// OS process id, for workers that run as their own process.
    pub pid: Option<u32>,
}

impl Launched {
    /// The identity written to the event log: the pid when there is one.
    pub fn log_identity(&self) -> u32 {
        self.pid.unwrap_or(self.id)
    }
}

pub trait WorkerLauncher: Send {
    /// Start a worker for `task`. Must not block on the worker's completion.
    fn launch(&mut self, task: &SyncTask) -> Result<Launched, DaemonError>;
}

/// Runs each task in a separate `fss-worker` process.
///
/// The worker is invoked as `fss-worker <source> <target> <file> <operation>`;
/// its stdout is piped back and stderr is inherited.
#[derive(Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    next_id: WorkerId,
    exits: UnboundedSender<WorkerExit>,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, exits: UnboundedSender<WorkerExit>) -> Self {
        Self {
            program,
            next_id: 1,
            exits,
        }
    }
}

fn advance(next_id: &mut WorkerId) -> WorkerId {
    let id = *next_id;
    *next_id = next_id.checked_add(1).unwrap_or(1);
    id
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&mut self, task: &SyncTask) -> Result<Launched, DaemonError> {
        let child = Command::new(&self.program)
            .arg(&task.source)
            .arg(&task.target)
            .arg(task.file.to_string())
            .arg(task.operation.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| DaemonError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let id = advance(&mut self.next_id);
        let pid = child.id();
        tracing::debug!(worker = id, ?pid, program = %self.program.display(), "worker spawned");

        let exits = self.exits.clone();
        tokio::spawn(async move {
            let output = match child.wait_with_output().await {
                Ok(output) => {
                    if !output.status.success() {
                        tracing::debug!(worker = id, ?pid, status = %output.status, "worker exited non-zero");
                    }
                    String::from_utf8_lossy(&output.stdout).into_owned()
                }
                Err(err) => {
                    tracing::warn!(worker = id, ?pid, error = %err, "failed to collect worker output");
                    String::new()
                }
            };
            let _ = exits.send(WorkerExit { id, output });
        });

        Ok(Launched { id, pid })
    }
}

/// Runs each task on tokio's blocking pool inside the manager process.
#[derive(Debug)]
pub struct InProcessLauncher {
    next_id: WorkerId,
    exits: UnboundedSender<WorkerExit>,
}

impl InProcessLauncher {
    pub fn new(exits: UnboundedSender<WorkerExit>) -> Self {
        Self { next_id: 1, exits }
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(&mut self, task: &SyncTask) -> Result<Launched, DaemonError> {
        let id = advance(&mut self.next_id);

        let task = task.clone();
        let exits = self.exits.clone();
        tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || fss_worker::execute(&task)).await;
            // A panicked worker yields empty output, which parses as UNKNOWN.
            let output = match joined {
                Ok(report) => report.render(),
                Err(err) => {
                    tracing::error!(worker = id, error = %err, "in-process worker panicked");
                    String::new()
                }
            };
            let _ = exits.send(WorkerExit { id, output });
        });

        Ok(Launched { id, pid: None })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct ManualState {
        next_id: WorkerId,
        launched: Vec<(WorkerId, SyncTask)>,
        fail_next: bool,
    }

    /// Records launches without running anything; tests feed exits by hand.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct ManualLauncher {
        state: Arc<Mutex<ManualState>>,
    }

    impl ManualLauncher {
        pub(crate) fn launched(&self) -> Vec<(WorkerId, SyncTask)> {
            self.state.lock().expect("launcher state").launched.clone()
        }

        pub(crate) fn last_id(&self) -> WorkerId {
            self.launched().last().map(|(id, _)| *id).expect("at least one launch")
        }

        pub(crate) fn fail_next_launch(&self) {
            self.state.lock().expect("launcher state").fail_next = true;
        }
    }

    impl WorkerLauncher for ManualLauncher {
        fn launch(&mut self, task: &SyncTask) -> Result<Launched, DaemonError> {
            let mut state = self.state.lock().expect("launcher state");
            if std::mem::take(&mut state.fail_next) {
                return Err(DaemonError::Spawn {
                    program: PathBuf::from("manual-worker"),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "launch refused"),
                });
            }
            state.next_id += 1;
            let id = 100 + state.next_id;
            state.launched.push((id, task.clone()));
            Ok(Launched { id, pid: None })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fss_core::{Operation, ReportStatus};
    use fss_worker::WorkerReport;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn in_process_worker_reports_through_exit_channel() {
        let src = tempfile::TempDir::new().expect("src");
        let dst = tempfile::TempDir::new().expect("dst");
        std::fs::write(src.path().join("a.txt"), "alpha").expect("seed");
        std::fs::write(src.path().join("b.txt"), "beta").expect("seed");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = InProcessLauncher::new(tx);
        let first = launcher
            .launch(&SyncTask::for_file(src.path(), dst.path(), "a.txt", Operation::Added))
            .expect("launch");
        let second = launcher
            .launch(&SyncTask::for_file(src.path(), dst.path(), "b.txt", Operation::Added))
            .expect("launch");
        assert_eq!(first, Launched { id: 1, pid: None });
        assert_eq!(second.id, 2);
        assert_eq!(second.log_identity(), 2);

        let mut outputs = Vec::new();
        for _ in 0..2 {
            let exit = rx.recv().await.expect("exit");
            outputs.push(WorkerReport::parse(&exit.output));
        }
        assert!(outputs.iter().all(|r| r.status == ReportStatus::Success));
        assert_eq!(
            std::fs::read_to_string(dst.path().join("a.txt")).expect("copied"),
            "alpha"
        );
        assert_eq!(
            std::fs::read_to_string(dst.path().join("b.txt")).expect("copied"),
            "beta"
        );
    }

    #[tokio::test]
    async fn missing_worker_program_is_a_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut launcher = ProcessLauncher::new(PathBuf::from("/nonexistent/fss-worker"), tx);
        let err = launcher.launch(&SyncTask::full("/a", "/b")).unwrap_err();
        assert!(matches!(err, DaemonError::Spawn { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn process_worker_output_is_captured() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // `echo` stands in for the worker: it prints its arguments and exits.
        let mut launcher = ProcessLauncher::new(PathBuf::from("echo"), tx);
        let launched = launcher.launch(&SyncTask::full("/a", "/b")).expect("launch");
        assert!(launched.pid.is_some());
        let exit = rx.recv().await.expect("exit");
        assert_eq!(exit.id, launched.id);
        assert_eq!(exit.output, "/a /b ALL FULL\n");
    }

    #[tokio::test]
    async fn process_workers_get_sequential_ids() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = ProcessLauncher::new(PathBuf::from("true"), tx);
        let ids: Vec<WorkerId> = (0..3)
            .map(|_| launcher.launch(&SyncTask::full("/a", "/b")).expect("launch").id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let mut exited = Vec::new();
        for _ in 0..3 {
            exited.push(rx.recv().await.expect("exit").id);
        }
        exited.sort_unstable();
        assert_eq!(exited, ids);
    }

    #[test]
    fn id_counter_wraps_to_one() {
        let mut next = WorkerId::MAX;
        assert_eq!(advance(&mut next), WorkerId::MAX);
        assert_eq!(advance(&mut next), 1);
    }
}
