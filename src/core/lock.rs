//! Cross-process vault lock.
//!
//! Every mutating command holds an exclusive advisory lock (`fs2`) on
//! `<backup root>/.lock` for its whole duration. Acquisition polls until a
//! bounded timeout and then fails with `Busy`. The OS drops the lock if the
//! holder dies, so a crashed process never wedges the vault.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Result, SwapError};
use crate::util::fsops;

/// Lock file name under the backup root.
pub const LOCK_FILE: &str = ".lock";

/// Default acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held vault lock; released on drop.
#[derive(Debug)]
pub struct VaultLock {
    file: File,
    path: PathBuf,
}

impl VaultLock {
    /// Acquire the lock under `backup_root`, waiting up to `timeout`.
    ///
    /// # Errors
    /// `Busy` if another process still holds it after `timeout`.
    pub fn acquire(backup_root: &Path, timeout: Duration) -> Result<Self> {
        fsops::ensure_private_dir(backup_root).map_err(|e| SwapError::io_at(backup_root, e))?;
        let path = backup_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SwapError::io_at(&path, e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Acquired vault lock");
                    return Ok(Self { file, path });
                }
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= timeout {
                        tracing::warn!(path = %path.display(), "Timed out waiting for vault lock");
                        return Err(SwapError::Busy {
                            path: path.display().to_string(),
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(SwapError::io_at(&path, e)),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(error = %e, "Failed to release vault lock");
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_times_out_busy() {
        let dir = tempfile::tempdir().unwrap();
        let _held = VaultLock::acquire(dir.path(), Duration::from_secs(1)).unwrap();

        let started = Instant::now();
        let err = VaultLock::acquire(dir.path(), Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err, SwapError::Busy { .. }));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let lock = VaultLock::acquire(dir.path(), Duration::from_secs(1)).unwrap();
            assert!(lock.path().ends_with(LOCK_FILE));
        }
        VaultLock::acquire(dir.path(), Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn waiter_gets_lock_once_released() {
        let dir = tempfile::tempdir().unwrap();
        let held = VaultLock::acquire(dir.path(), Duration::from_secs(1)).unwrap();

        let root = dir.path().to_path_buf();
        let waiter = std::thread::spawn(move || VaultLock::acquire(&root, Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(250));
        drop(held);

        assert!(waiter.join().unwrap().is_ok());
    }
}
