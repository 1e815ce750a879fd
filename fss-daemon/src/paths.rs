use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SOCKET_FILE: &str = "fss.sock";
pub const WORKER_BINARY: &str = "fss-worker";

pub const DEFAULT_WORKER_LIMIT: usize = 5;
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

pub fn socket_path_in(dir: &Path) -> PathBuf {
    dir.join(SOCKET_FILE)
}

/// `fss-worker` next to the running executable, or a bare name for `$PATH` lookup.
pub fn default_worker_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(WORKER_BINARY))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
}
