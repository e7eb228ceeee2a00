//! Content-addressable on-disk cache for remote model calls.
//!
//! - [`key`]: request normalization and MD5 content addressing.
//! - [`lock`]: per-root lock file with bounded acquisition.
//! - [`store`]: root registry and lock-guarded entry I/O.
//!
//! Entries survive process restarts, so replaying a pipeline against a
//! warm cache makes no remote calls at all.

pub mod key;
pub mod lock;
pub mod store;

pub use key::{CacheKey, DEFAULT_BLACKLIST, KeyCodec};
pub use lock::{LOCK_FILE_NAME, LockGuard, RootLock};
pub use store::{CacheEntry, CacheRoot, CacheStore, CachedRequest, RootHandle};

use std::path::PathBuf;
use std::time::Duration;

/// Default lock acquisition timeout for cache operations.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the on-disk cache.
///
/// ```rust
/// # use hugin::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .base_dir("/var/cache/hugin")
///     .lock_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory under which default roots are created.
    /// Default: `<cwd>/.cache`.
    pub base_dir: Option<PathBuf>,
    /// Maximum wait for a root's lock. Default: 5s.
    pub lock_timeout: Duration,
    /// Fields removed before hashing and before params are persisted.
    /// Default: `["api_key"]`.
    pub blacklist: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory for default roots.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Set the lock acquisition timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the field blacklist.
    pub fn blacklist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = keys.into_iter().map(Into::into).collect();
        self
    }
}
