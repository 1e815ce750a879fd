//! End-to-end: a real manager process spawning real worker processes,
//! driven through the console subcommand.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct ManagerProcess {
    child: Child,
    socket: PathBuf,
}

impl ManagerProcess {
    fn start(config: &Path, log: &Path, socket: &Path, workers: usize) -> Self {
        let child = StdCommand::new(assert_cmd::cargo::cargo_bin("fss"))
            .arg("manager")
            .arg("-c")
            .arg(config)
            .arg("-l")
            .arg(log)
            .arg("-n")
            .arg(workers.to_string())
            .arg("--socket")
            .arg(socket)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn manager");
        Self {
            child,
            socket: socket.to_path_buf(),
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return status.success();
            }
            sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for ManagerProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn console(socket: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fss").expect("fss binary");
    cmd.arg("console")
        .arg("--socket")
        .arg(socket)
        .args(["--timeout-ms", "300"]);
    cmd
}

fn console_output(socket: &Path, words: &[&str]) -> String {
    let output = console(socket).args(words).output().expect("run console");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn seed(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).expect("create dir");
    for (name, body) in files {
        fs::write(dir.join(name), body).expect("seed file");
    }
}

#[test]
fn manager_mirrors_sources_and_shuts_down_on_request() {
    let root = TempDir::new().expect("root");
    let (src_a, dst_a) = (root.path().join("a"), root.path().join("a-mirror"));
    let (src_b, dst_b) = (root.path().join("b"), root.path().join("b-mirror"));
    seed(&src_a, &[("one.txt", "1"), ("two.txt", "2")]);
    seed(&src_b, &[("three.txt", "3")]);

    let config = root.path().join("fss.conf");
    fs::write(
        &config,
        format!(
            "# test pairs\n{} {}\n{} {}\n",
            src_a.display(),
            dst_a.display(),
            src_b.display(),
            dst_b.display()
        ),
    )
    .expect("write config");
    let log = root.path().join("events.log");
    let socket = root.path().join("fss.sock");

    // One worker slot, so the second configured pair must wait in the queue.
    let mut manager = ManagerProcess::start(&config, &log, &socket, 1);
    assert!(
        wait_until(Duration::from_secs(10), || manager.socket.exists()),
        "manager socket never appeared"
    );

    assert!(
        wait_until(Duration::from_secs(15), || {
            dst_a.join("two.txt").exists() && dst_b.join("three.txt").exists()
        }),
        "initial full syncs did not complete"
    );

    let status_a = format!("{}", src_a.display());
    assert!(
        wait_until(Duration::from_secs(10), || {
            let out = console_output(&socket, &["status", &status_a]);
            out.contains("Status: Active") && !out.contains("Last Sync: Never")
        }),
        "status never showed a completed sync"
    );

    // A file moved into a watched source is mirrored by a file-level task.
    let staged = root.path().join("late.staged");
    fs::write(&staged, "late").expect("stage late file");
    fs::rename(&staged, src_a.join("late.txt")).expect("move late file in");
    assert!(
        wait_until(Duration::from_secs(10), || {
            fs::read_to_string(dst_a.join("late.txt")).is_ok_and(|body| body == "late")
        }),
        "new file was not mirrored"
    );

    console(&socket)
        .args(["cancel", &status_a])
        .assert()
        .success()
        .stdout(predicate::str::contains("Monitoring stopped for"));

    console(&socket)
        .args(["bogus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unrecognized command: bogus"));

    console(&socket)
        .arg("shutdown")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Shutting down manager...")
                .and(predicate::str::contains("Manager shutdown complete.")),
        );

    assert!(
        manager.wait_for_exit(Duration::from_secs(10)),
        "manager did not exit cleanly"
    );
    assert!(!socket.exists(), "socket file left behind");

    let events = fs::read_to_string(&log).expect("read event log");
    assert!(events.contains("Queued task:"), "log: {events}");
    assert!(events.contains("[FULL] [SUCCESS] [2 files processed]"), "log: {events}");
    assert!(events.contains("[FULL] [SUCCESS] [1 files processed]"), "log: {events}");
    assert!(events.contains("Monitoring stopped for"), "log: {events}");
}

#[test]
fn manager_refuses_missing_config() {
    let root = TempDir::new().expect("root");
    Command::cargo_bin("fss")
        .expect("fss binary")
        .arg("manager")
        .arg("-c")
        .arg(root.path().join("absent.conf"))
        .arg("-l")
        .arg(root.path().join("events.log"))
        .arg("--socket")
        .arg(root.path().join("fss.sock"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.conf"));
}

#[test]
fn console_without_manager_fails() {
    let root = TempDir::new().expect("root");
    console(&root.path().join("fss.sock"))
        .args(["status", "/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to connect to manager"));
}
