use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::engine::{Engine, Reply};
use crate::error::{io_err, DaemonError};
use crate::event_log::EventLog;
use crate::launcher::{InProcessLauncher, ProcessLauncher, WorkerExit, WorkerLauncher};
use crate::paths::TICK_INTERVAL;
use crate::protocol::Command;
use crate::scheduler::Scheduler;
use crate::watch::{RawChange, WatchTable};

/// How workers are run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStrategy {
    /// Spawn this executable once per task.
    Process(PathBuf),
    /// Run tasks on the manager's blocking thread pool.
    InProcess,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub config_file: PathBuf,
    pub log_file: PathBuf,
    pub socket: PathBuf,
    pub worker_limit: usize,
    pub strategy: WorkerStrategy,
    /// Emit diagnostics as JSON lines instead of plain text.
    pub json_logs: bool,
}

struct CommandRequest {
    line: String,
    respond_to: oneshot::Sender<CommandResponse>,
}

struct CommandResponse {
    text: String,
    /// Close the connection after writing.
    close: bool,
}

/// Start the manager and block the current thread until it exits.
pub fn start_blocking(options: ManagerOptions) -> Result<(), DaemonError> {
    init_tracing(options.json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options))
}

/// Run the manager until `shutdown` is received or the process is interrupted.
pub async fn run(options: ManagerOptions) -> Result<(), DaemonError> {
    let config = fss_core::load_config(&options.config_file)?;
    let log = EventLog::open(&options.log_file)?;

    let (exit_tx, exit_rx) = mpsc::unbounded_channel::<WorkerExit>();
    let (change_tx, change_rx) = mpsc::unbounded_channel::<RawChange>();
    let (command_tx, command_rx) = mpsc::channel::<CommandRequest>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let launcher: Box<dyn WorkerLauncher> = match &options.strategy {
        WorkerStrategy::Process(program) => Box::new(ProcessLauncher::new(program.clone(), exit_tx)),
        WorkerStrategy::InProcess => Box::new(InProcessLauncher::new(exit_tx)),
    };
    let scheduler = Scheduler::new(options.worker_limit, launcher, log.clone());
    let mut engine = Engine::new(WatchTable::new(change_tx), scheduler, log);

    // Bind before bootstrapping so a second manager fails before doing any work.
    prepare_socket_for_bind(&options.socket)?;
    let listener = UnixListener::bind(&options.socket).map_err(|e| io_err(&options.socket, e))?;
    set_socket_permissions(&options.socket)?;
    tracing::info!(
        socket = %options.socket.display(),
        workers = engine.scheduler().ceiling(),
        "manager listening"
    );

    engine.bootstrap(&config);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let socket = options.socket.clone();
        tokio::spawn(async move {
            socket_server_task(listener, socket, command_tx, shutdown, shutdown_rx).await
        })
    };

    let result = control_loop(engine, command_rx, change_rx, exit_rx).await;
    let _ = shutdown_tx.send(());
    handle_join("socket_server", socket_handle.await)?;
    result
}

/// Single owner of manager state. Takes the receivers by value so pending
/// requests are dropped, and their clients released, when the loop ends.
async fn control_loop(
    mut engine: Engine,
    mut commands: mpsc::Receiver<CommandRequest>,
    mut changes: mpsc::UnboundedReceiver<RawChange>,
    mut exits: mpsc::UnboundedReceiver<WorkerExit>,
) -> Result<(), DaemonError> {
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(exit) = exits.recv() => {
                engine.handle_exit(exit);
            }
            Some(change) = changes.recv() => {
                engine.handle_change(change);
                while let Ok(change) = changes.try_recv() {
                    engine.handle_change(change);
                }
            }
            request = commands.recv() => {
                let Some(request) = request else {
                    return Err(DaemonError::ChannelClosed("command queue"));
                };
                match engine.execute(Command::parse(&request.line)) {
                    Reply::Text(text) => {
                        let _ = request.respond_to.send(CommandResponse { text, close: false });
                    }
                    Reply::Shutdown(notice) => {
                        let done = engine.shutdown(&mut exits).await;
                        let _ = request.respond_to.send(CommandResponse {
                            text: format!("{notice}\n{done}"),
                            close: true,
                        });
                        return Ok(());
                    }
                }
            }
            _ = tick.tick() => engine.housekeeping(),
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| DaemonError::Protocol(format!("ctrl-c handler failed: {e}")))?;
                tracing::info!("received ctrl-c, shutting down manager");
                if let Reply::Shutdown(_) = engine.execute(Command::Shutdown) {
                    engine.shutdown(&mut exits).await;
                }
                return Ok(());
            }
        }
    }
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    commands: mpsc::Sender<CommandRequest>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "command socket accept failed");
                        continue;
                    }
                };
                let commands = commands.clone();
                let client_shutdown = shutdown_tx.subscribe();
                clients.spawn(async move {
                    if let Err(err) = handle_socket_client(stream, commands, client_shutdown).await {
                        tracing::debug!(error = %err, "command client ended");
                    }
                });
            }
        }
    }

    drop(listener);
    while clients.join_next().await.is_some() {}

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    commands: mpsc::Sender<CommandRequest>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = lines.next_line() => line.map_err(|e| io_err("command socket read", e))?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let (respond_to, response) = oneshot::channel();
        commands
            .send(CommandRequest { line, respond_to })
            .await
            .map_err(|_| DaemonError::ChannelClosed("command queue"))?;
        let response = response
            .await
            .map_err(|_| DaemonError::ChannelClosed("command response"))?;

        write_response(&mut writer, &response.text).await?;
        if response.close {
            break;
        }
    }

    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, text: &str) -> Result<(), DaemonError> {
    writer
        .write_all(text.as_bytes())
        .await
        .map_err(|e| io_err("command socket write", e))?;
    if !text.ends_with('\n') {
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| io_err("command socket write", e))?;
    }
    writer
        .flush()
        .await
        .map_err(|e| io_err("command socket flush", e))?;
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "manager socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale manager socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::time::{sleep, Instant};

    use crate::protocol::send_command;

    struct Layout {
        _root: TempDir,
        src: PathBuf,
        dst: PathBuf,
        options: ManagerOptions,
    }

    fn layout() -> Layout {
        let root = TempDir::new().expect("tempdir");
        let src = root.path().join("src");
        let dst = root.path().join("dst");
        fs::create_dir_all(&src).expect("src dir");
        fs::write(src.join("a.txt"), "alpha").expect("seed a");
        fs::write(src.join("b.txt"), "beta").expect("seed b");

        let config = root.path().join("fss.conf");
        fs::write(&config, format!("{} {}\n", src.display(), dst.display())).expect("config");

        let options = ManagerOptions {
            config_file: config,
            log_file: root.path().join("events.log"),
            socket: root.path().join("fss.sock"),
            worker_limit: 2,
            strategy: WorkerStrategy::InProcess,
            json_logs: false,
        };
        Layout {
            _root: root,
            src,
            dst,
            options,
        }
    }

    async fn command(socket: &Path, line: &str) -> Vec<String> {
        let socket = socket.to_path_buf();
        let line = line.to_string();
        tokio::task::spawn_blocking(move || {
            send_command(&socket, &line, Duration::from_millis(300)).expect("command")
        })
        .await
        .expect("join command")
    }

    async fn wait_until<F: FnMut() -> bool>(what: &str, mut check: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            sleep(Duration::from_millis(50)).await;
        }
    }

    #[test]
    fn stale_socket_is_removed_before_bind() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("fss.sock");
        {
            let _listener = std::os::unix::net::UnixListener::bind(&socket).expect("bind");
        }
        assert!(socket.exists(), "closed listener leaves its socket file behind");
        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }

    #[test]
    fn live_socket_blocks_bind() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("fss.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).expect("bind");
        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"), "got: {err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_config_fails_startup() {
        let mut fx = layout();
        fx.options.config_file = fx.options.config_file.with_file_name("absent.conf");
        let err = run(fx.options.clone()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
        assert!(!fx.options.socket.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manager_syncs_configured_pair_and_shuts_down() {
        let fx = layout();
        let manager = tokio::spawn(run(fx.options.clone()));

        let socket = fx.options.socket.clone();
        wait_until("socket", || socket.exists()).await;

        let dst = fx.dst.clone();
        wait_until("initial full sync", || {
            dst.join("a.txt").exists() && dst.join("b.txt").exists()
        })
        .await;

        let status_line = format!("status {}", fx.src.display());
        let mut status = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            status = command(&socket, &status_line).await;
            if status.iter().any(|l| l.starts_with("Last Sync:") && !l.ends_with("Never")) {
                break;
            }
        }
        assert!(status.iter().any(|l| l == "Errors: 0"), "status: {status:?}");
        assert!(status.iter().any(|l| l == "Status: Active"), "status: {status:?}");

        // Removing a source file removes its mirror.
        fs::remove_file(fx.src.join("a.txt")).expect("remove source file");
        wait_until("delete propagated", || !dst.join("a.txt").exists()).await;

        let bogus = command(&socket, "frobnicate now").await;
        assert!(
            bogus.iter().any(|l| l.ends_with("Unrecognized command: frobnicate now")),
            "got: {bogus:?}"
        );

        let bye = command(&socket, "shutdown").await;
        assert!(
            bye.last().is_some_and(|l| l.ends_with("Manager shutdown complete.")),
            "got: {bye:?}"
        );

        tokio::time::timeout(Duration::from_secs(10), manager)
            .await
            .expect("manager exits")
            .expect("join manager")
            .expect("manager result");
        assert!(!socket.exists(), "socket removed on exit");

        let log = fs::read_to_string(&fx.options.log_file).expect("event log");
        assert!(log.contains("Added directory:"), "log: {log}");
        assert!(log.contains("[FULL] [SUCCESS] [2 files processed]"), "log: {log}");
        assert!(log.contains("[DELETED] [SUCCESS] [File a.txt was deleted]"), "log: {log}");
        assert!(log.contains("Manager shutdown complete."), "log: {log}");
    }
}
