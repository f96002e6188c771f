//! Cross-process write lock for the JSON state files.
//!
//! Several `thumbwatch` processes may share one entity file and one
//! scheduler file (`serve` running while `add` registers a video). Every
//! mutation takes this lock, re-reads the file, applies its change and
//! writes the result back before releasing it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How long a writer waits for a held lock.
pub(crate) const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A lock file older than this is assumed to belong to a crashed process.
const STALE_AFTER: Duration = Duration::from_secs(30);

/// Held lock; the lock file is removed on drop.
#[derive(Debug)]
pub(crate) struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock beside `state_path` is ours or `timeout` passes.
    ///
    /// Errors are plain strings so each caller can wrap them in its own
    /// error variant.
    pub(crate) fn acquire(
        state_path: &Path,
        timeout: Duration,
    ) -> std::result::Result<Self, String> {
        let path = lock_path(state_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create lock directory: {e}"))?;
        }

        let started = std::time::Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale_lock(&path);
                    if started.elapsed() > timeout {
                        return Err(format!("timed out waiting for lock {}", path.display()));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(e) => {
                    return Err(format!("cannot create lock {}: {e}", path.display()));
                }
            }
        }
    }

    /// Async wrapper that waits on the blocking pool.
    pub(crate) async fn acquire_async(
        state_path: &Path,
        timeout: Duration,
    ) -> std::result::Result<Self, String> {
        let state_path = state_path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&state_path, timeout))
            .await
            .map_err(|e| format!("lock task failed: {e}"))?
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `entities.json` locks through `entities.json.lock`.
fn lock_path(state_path: &Path) -> PathBuf {
    let mut name = state_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    state_path.with_file_name(name)
}

fn evict_stale_lock(path: &Path) {
    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    let Ok(modified) = metadata.modified() else {
        return;
    };
    let Ok(age) = SystemTime::now().duration_since(modified) else {
        return;
    };
    if age > STALE_AFTER {
        tracing::warn!(path = %path.display(), "removing stale state lock");
        let _ = std::fs::remove_file(path);
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    let tmp = path.with_file_name(name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
