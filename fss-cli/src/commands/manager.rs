//! `fss manager` — run the synchronization manager in the foreground.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use fss_daemon::paths::{default_worker_program, DEFAULT_WORKER_LIMIT};
use fss_daemon::{start_blocking, ManagerOptions, WorkerStrategy};

#[derive(Args, Debug)]
pub struct ManagerArgs {
    /// Event log file (appended to).
    #[arg(short = 'l', long = "log")]
    pub log_file: PathBuf,

    /// Directory-pair configuration file, one `source target` per line.
    #[arg(short = 'c', long = "config")]
    pub config_file: PathBuf,

    /// Maximum number of concurrent workers.
    #[arg(short = 'n', long = "workers", default_value_t = DEFAULT_WORKER_LIMIT)]
    pub workers: usize,

    /// Command socket path.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Worker executable. Defaults to `fss-worker` beside this binary.
    #[arg(long, conflicts_with = "in_process")]
    pub worker: Option<PathBuf>,

    /// Run workers on a thread pool inside the manager instead of as processes.
    #[arg(long)]
    pub in_process: bool,

    /// Emit diagnostics as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl ManagerArgs {
    pub fn run(self) -> Result<()> {
        let options = self.into_options()?;
        start_blocking(options).context("manager exited with error")
    }

    fn into_options(self) -> Result<ManagerOptions> {
        if self.workers == 0 {
            bail!("--workers must be at least 1");
        }

        let strategy = if self.in_process {
            WorkerStrategy::InProcess
        } else {
            WorkerStrategy::Process(self.worker.unwrap_or_else(default_worker_program))
        };

        Ok(ManagerOptions {
            config_file: self.config_file,
            log_file: self.log_file,
            socket: self.socket.unwrap_or_else(crate::default_socket),
            worker_limit: self.workers,
            strategy,
            json_logs: self.json,
        })
    }
}
