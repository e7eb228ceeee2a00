//! Cross-process advisory lock guarding one cache root.
//!
//! The lock lives in `<root>/lockfile.lock`. Every acquisition opens its own
//! handle, so threads of the same process exclude each other exactly like
//! separate processes do. Acquisition polls with a short interval and gives
//! up after a bounded timeout; callers never wait indefinitely.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::{HuginError, Result};

/// File name of the lock inside a cache root.
pub const LOCK_FILE_NAME: &str = "lockfile.lock";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lock file for one cache root.
#[derive(Debug, Clone)]
pub struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Lock for the given root directory. Nothing is created until the
    /// first acquisition.
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(LOCK_FILE_NAME),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// Returns [`HuginError::CacheLockTimeout`] when another holder keeps
    /// the lock past the deadline.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(LockGuard { file }),
                Err(TryLockError::WouldBlock) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HuginError::CacheLockTimeout {
                            path: self.path.clone(),
                            timeout,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(TryLockError::Error(e)) => return Err(HuginError::Io(e)),
            }
        }
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // closing the handle releases the lock as well
        let _ = self.file.unlock();
    }
}
