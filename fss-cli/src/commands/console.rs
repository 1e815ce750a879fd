//! `fss console` — send commands to a running manager.
//!
//! With trailing words, the words form one command that is sent before the
//! console exits. Otherwise commands are read from stdin, one per line, until
//! end of input, `exit`, or a completed `shutdown`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use fss_daemon::event_log::stamp;
use fss_daemon::paths::RESPONSE_TIMEOUT;
use fss_daemon::{Client, Command};

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// Command socket path.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Append each sent command to this file.
    #[arg(short = 'l', long = "log")]
    pub log_file: Option<PathBuf>,

    /// How long to wait for a response, in milliseconds.
    #[arg(long, default_value_t = RESPONSE_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// A single command to send, e.g. `status /data/photos`.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl ConsoleArgs {
    pub fn run(self) -> Result<()> {
        let socket = self.socket.clone().unwrap_or_else(crate::default_socket);
        let client = Client::connect(&socket)
            .with_context(|| format!("failed to connect to manager at {}", socket.display()))?;
        let mut session = Session {
            client,
            log: open_command_log(self.log_file.as_ref())?,
            timeout: Duration::from_millis(self.timeout_ms),
        };

        if !self.command.is_empty() {
            session.send(&self.command.join(" "))?;
            return Ok(());
        }

        let stdin = io::stdin();
        let mut input = stdin.lock();
        loop {
            print!("> ");
            io::stdout().flush().context("failed to flush stdout")?;

            let mut line = String::new();
            if input.read_line(&mut line).context("failed to read stdin")? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "exit" {
                break;
            }
            if session.send(line)? {
                break;
            }
        }
        Ok(())
    }
}

struct Session {
    client: Client,
    log: Option<File>,
    timeout: Duration,
}

impl Session {
    /// Send one command and print the reply. Returns `true` after a shutdown.
    fn send(&mut self, line: &str) -> Result<bool> {
        if let Some(log) = self.log.as_mut() {
            writeln!(log, "{}", stamp(&format!("Command {line}")))
                .context("failed to write console log")?;
        }

        let reply = self
            .client
            .request(line, self.timeout)
            .context("failed to exchange command with manager")?;
        if reply.is_empty() {
            eprintln!("no response from manager");
        }
        for reply_line in &reply {
            println!("{reply_line}");
        }
        Ok(Command::parse(line).is_shutdown())
    }
}

fn open_command_log(path: Option<&PathBuf>) -> Result<Option<File>> {
    path.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open console log {}", path.display()))
    })
    .transpose()
}
