//! Line-oriented command protocol between the console and the manager.
//!
//! Requests are single lines of whitespace-separated tokens. Responses are
//! one or more newline-terminated text lines with no explicit terminator, so
//! the client reads until the connection closes or the read timeout fires.
//! A `shutdown` response is followed by the manager closing the connection.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use crate::error::{io_err, DaemonError};

const CONNECT_ATTEMPTS: usize = 5;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { source: PathBuf, target: PathBuf },
    Cancel { source: PathBuf },
    Status { source: PathBuf },
    Sync { source: PathBuf },
    Shutdown,
    /// Anything that does not match a verb and its exact argument count.
    Unrecognized(String),
}

impl Command {
    /// Verbs are case-sensitive and argument counts are exact.
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["add", source, target] => Command::Add {
                source: PathBuf::from(source),
                target: PathBuf::from(target),
            },
            ["cancel", source] => Command::Cancel {
                source: PathBuf::from(source),
            },
            ["status", source] => Command::Status {
                source: PathBuf::from(source),
            },
            ["sync", source] => Command::Sync {
                source: PathBuf::from(source),
            },
            ["shutdown"] => Command::Shutdown,
            _ => Command::Unrecognized(line.trim().to_string()),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Command::Shutdown)
    }
}

/// A connection to the manager's command socket.
#[derive(Debug)]
pub struct Client {
    socket: PathBuf,
    reader: BufReader<UnixStream>,
}

impl Client {
    /// Connect, retrying briefly while the manager is still binding its socket.
    pub fn connect(socket: &Path) -> Result<Self, DaemonError> {
        let mut last_not_running: Option<DaemonError> = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            match connect_once(socket) {
                Ok(stream) => {
                    return Ok(Self {
                        socket: socket.to_path_buf(),
                        reader: BufReader::new(stream),
                    })
                }
                Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                    last_not_running = Some(err);
                    if attempt + 1 < CONNECT_ATTEMPTS {
                        sleep(CONNECT_BACKOFF);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_not_running.unwrap_or_else(|| DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        }))
    }

    /// Send one command line and collect the response lines.
    ///
    /// Reading stops at end of stream or once no data arrives for `timeout`.
    /// `shutdown` ignores the timeout and waits for the manager to close the
    /// connection, which happens only after its workers have drained.
    pub fn request(&mut self, line: &str, timeout: Duration) -> Result<Vec<String>, DaemonError> {
        let line = line.trim();
        let wait = if Command::parse(line).is_shutdown() {
            None
        } else {
            Some(timeout)
        };

        let stream = self.reader.get_mut();
        stream
            .write_all(format!("{line}\n").as_bytes())
            .map_err(|e| io_err(&self.socket, e))?;
        stream.flush().map_err(|e| io_err(&self.socket, e))?;
        stream
            .set_read_timeout(wait)
            .map_err(|e| io_err(&self.socket, e))?;

        let mut lines = Vec::new();
        loop {
            let mut buf = String::new();
            match self.reader.read_line(&mut buf) {
                Ok(0) => break,
                Ok(_) => lines.push(buf.trim_end_matches(['\r', '\n']).to_string()),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if !buf.is_empty() {
                        lines.push(buf.trim_end_matches(['\r', '\n']).to_string());
                    }
                    break;
                }
                Err(err) => return Err(io_err(&self.socket, err)),
            }
        }
        Ok(lines)
    }
}

/// One-shot helper: connect, send `line`, return the response lines.
pub fn send_command(socket: &Path, line: &str, timeout: Duration) -> Result<Vec<String>, DaemonError> {
    Client::connect(socket)?.request(line, timeout)
}

fn connect_once(socket: &Path) -> Result<UnixStream, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }
    UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_verb() {
        assert_eq!(
            Command::parse("add /a /b"),
            Command::Add {
                source: PathBuf::from("/a"),
                target: PathBuf::from("/b")
            }
        );
        assert_eq!(
            Command::parse("  cancel   /a \n"),
            Command::Cancel {
                source: PathBuf::from("/a")
            }
        );
        assert_eq!(
            Command::parse("status /a"),
            Command::Status {
                source: PathBuf::from("/a")
            }
        );
        assert_eq!(
            Command::parse("sync /a"),
            Command::Sync {
                source: PathBuf::from("/a")
            }
        );
        assert_eq!(Command::parse("shutdown"), Command::Shutdown);
    }

    #[test]
    fn wrong_arity_and_case_are_unrecognized() {
        for line in ["add /a", "sync", "status /a /b", "shutdown now", "SYNC /a", "frobnicate"] {
            assert_eq!(
                Command::parse(line),
                Command::Unrecognized(line.to_string()),
                "line: {line}"
            );
        }
    }

    #[test]
    fn connect_without_socket_reports_not_running() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let socket = dir.path().join("fss.sock");
        let err = Client::connect(&socket).unwrap_err();
        assert!(
            matches!(err, DaemonError::DaemonNotRunning { .. }),
            "got: {err}"
        );
    }

    #[test]
    fn request_collects_lines_until_close() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::TempDir::new().expect("tempdir");
        let socket = dir.path().join("fss.sock");
        let listener = UnixListener::bind(&socket).expect("bind");

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).expect("read request");
            let stream = reader.get_mut();
            stream
                .write_all(b"first\nsecond\n")
                .expect("write response");
            line
        });

        let lines = send_command(&socket, "status /a", Duration::from_secs(5)).expect("request");
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(server.join().expect("server thread"), "status /a\n");
    }
}
