//! fss-worker — perform one synchronization task and report on stdout.
//!
//! ```text
//! fss-worker <source> <target> <file|ALL> <FULL|ADDED|MODIFIED|DELETED>
//! ```
//!
//! Exits 0 for SUCCESS or PARTIAL and 1 for ERROR. Diagnostics go to stderr
//! (`RUST_LOG` controls verbosity); stdout carries only the report block.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use fss_core::ReportStatus;

#[derive(Parser, Debug)]
#[command(name = "fss-worker", version, about = "Run one directory synchronization task")]
struct WorkerCli {
    /// Source directory.
    source: String,
    /// Target directory.
    target: String,
    /// File name inside the source, or `ALL` for the whole directory.
    file: String,
    /// FULL, ADDED, MODIFIED or DELETED.
    operation: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = WorkerCli::parse();
    let report = fss_worker::execute_args(&cli.source, &cli.target, &cli.file, &cli.operation);

    let mut stdout = std::io::stdout().lock();
    if stdout
        .write_all(report.render().as_bytes())
        .and_then(|()| stdout.flush())
        .is_err()
    {
        return ExitCode::FAILURE;
    }

    match report.status {
        ReportStatus::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
