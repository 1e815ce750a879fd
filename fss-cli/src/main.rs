//! fss — directory synchronization manager and console.
//!
//! # Usage
//!
//! ```text
//! fss manager -c <config> -l <log> [-n <workers>] [--socket <path>] [--worker <path> | --in-process]
//! fss console [-l <log>] [--socket <path>] [--timeout-ms <ms>] [command...]
//! ```
//!
//! Console commands: `add <src> <dst>`, `cancel <src>`, `status <src>`,
//! `sync <src>`, `shutdown`.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{console::ConsoleArgs, manager::ManagerArgs};
use fss_daemon::paths::socket_path_in;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "fss",
    version,
    about = "Keep target directories mirrored from watched source directories",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the manager in the foreground: watch sources and dispatch workers.
    Manager(ManagerArgs),

    /// Send commands to a running manager.
    Console(ConsoleArgs),
}

/// `$XDG_RUNTIME_DIR/fss.sock`, or the temp directory when there is no runtime dir.
pub(crate) fn default_socket() -> PathBuf {
    let dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
    socket_path_in(&dir)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Manager(args) => args.run(),
        Commands::Console(args) => args.run(),
    }
}
