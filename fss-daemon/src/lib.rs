//! fss manager runtime: watch table, change translator, worker pool
//! scheduler, command protocol, and the control loop that ties them together.

pub mod engine;
mod error;
pub mod event_log;
pub mod launcher;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;
pub mod translator;
pub mod watch;

pub use engine::{Engine, Reply};
pub use error::DaemonError;
pub use event_log::EventLog;
pub use launcher::{
    InProcessLauncher, Launched, ProcessLauncher, WorkerExit, WorkerId, WorkerLauncher,
};
pub use protocol::{send_command, Client, Command};
pub use runtime::{run, start_blocking, ManagerOptions, WorkerStrategy};
pub use scheduler::{ActiveWorker, Completion, Scheduler, Submission};
pub use watch::{RawChange, WatchId, WatchTable};
