//! Lock-guarded on-disk cache roots.
//!
//! A [`CacheStore`] keeps one [`CacheRoot`] per directory. Each root owns
//! its lock file and a sanitized snapshot of the parameters the cached
//! model was configured with; the snapshot is persisted next to every
//! entry so a cache directory documents how its responses were produced.
//!
//! Entries live at `<root>/<shard>/<digest>.json`:
//!
//! ```json
//! {
//!   "request": { "prompt": "...", "params": { "model": "..." } },
//!   "response": "..."
//! }
//! ```
//!
//! The cache is best-effort. Reads that cannot get the lock in time, or
//! that find a malformed file, report a miss; writes that cannot get the
//! lock are dropped. Every such failure is logged and counted, none is
//! returned to the caller.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::CacheConfig;
use super::key::{CacheKey, KeyCodec};
use super::lock::RootLock;
use crate::telemetry;
use crate::{HuginError, Result};

/// Shared handle to a registered root.
pub type RootHandle = Arc<CacheRoot>;

/// On-disk entry layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub request: CachedRequest,
    pub response: Value,
}

/// Request half of a [`CacheEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRequest {
    pub prompt: Value,
    #[serde(default)]
    pub params: Value,
}

/// Registry of cache roots for one process.
pub struct CacheStore {
    config: CacheConfig,
    codec: KeyCodec,
    roots: RwLock<HashMap<PathBuf, RootHandle>>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new(config: CacheConfig) -> Self {
        let codec = KeyCodec::new(config.blacklist.iter().cloned());
        Self {
            config,
            codec,
            roots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Register (or re-register) a cache root.
    ///
    /// A missing or empty `root` resolves to the default directory,
    /// namespaced by `params["model"]` when present. Registering a root a
    /// second time keeps its lock and replaces its params snapshot.
    pub fn register(&self, root: Option<&Path>, params: &Value) -> Result<RootHandle> {
        let path = match root {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => self.default_root(params),
        };
        let sanitized = self.codec.normalize(params);

        let mut roots = self.roots.write().map_err(|e| {
            HuginError::Configuration(format!("Failed to acquire cache registry lock: {e}"))
        })?;

        if let Some(existing) = roots.get(&path) {
            existing.replace_params(sanitized);
            debug!(root = %path.display(), "cache root re-registered");
            return Ok(Arc::clone(existing));
        }

        let handle = Arc::new(CacheRoot::new(
            path.clone(),
            sanitized,
            self.codec.clone(),
            self.config.lock_timeout,
        ));
        roots.insert(path.clone(), Arc::clone(&handle));
        info!(root = %path.display(), "cache root registered");
        Ok(handle)
    }

    /// Forget a root. Files on disk are left alone.
    ///
    /// Returns true if the root was registered.
    pub fn unregister(&self, root: &Path) -> bool {
        self.roots
            .write()
            .map(|mut roots| roots.remove(root).is_some())
            .unwrap_or(false)
    }

    /// Look up a registered root.
    pub fn get(&self, root: &Path) -> Option<RootHandle> {
        self.roots
            .read()
            .ok()
            .and_then(|roots| roots.get(root).cloned())
    }

    /// Paths of all registered roots.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots
            .read()
            .map(|roots| roots.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Directory used when no explicit root is given.
    pub fn default_root(&self, params: &Value) -> PathBuf {
        let base = self.config.base_dir.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".cache")
        });
        match params.get("model").and_then(Value::as_str) {
            Some(model) if !model.is_empty() => base.join(model),
            _ => base,
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// One cache directory: lock, params snapshot, and entry I/O.
///
/// All methods block on file I/O and on the root lock (bounded by the
/// configured timeout). Async callers should run them on the blocking pool.
#[derive(Debug)]
pub struct CacheRoot {
    path: PathBuf,
    lock: RootLock,
    params: RwLock<Value>,
    codec: KeyCodec,
    lock_timeout: Duration,
}

impl CacheRoot {
    fn new(path: PathBuf, params: Value, codec: KeyCodec, lock_timeout: Duration) -> Self {
        Self {
            lock: RootLock::new(&path),
            path,
            params: RwLock::new(params),
            codec,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> &RootLock {
        &self.lock
    }

    /// Sanitized params snapshot.
    pub fn params(&self) -> Value {
        self.params
            .read()
            .map(|p| p.clone())
            .unwrap_or(Value::Null)
    }

    fn replace_params(&self, params: Value) {
        if let Ok(mut current) = self.params.write() {
            *current = params;
        }
    }

    /// Key for a prompt under this root's codec.
    pub fn key(&self, prompt: &Value) -> CacheKey {
        self.codec.key(prompt)
    }

    /// Absolute path of the entry for `prompt`.
    pub fn entry_path(&self, prompt: &Value) -> PathBuf {
        self.path.join(self.key(prompt).relative_path())
    }

    /// Cached response for `prompt`, or `None` on miss.
    pub fn read(&self, prompt: &Value) -> Option<Value> {
        let path = self.entry_path(prompt);
        if !path.exists() {
            return None;
        }

        let _guard = match self.lock.acquire(self.lock_timeout) {
            Ok(guard) => guard,
            Err(e) => {
                self.log_lock_failure(&e, &path);
                return None;
            }
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => Some(entry.response),
            Err(e) => {
                let err = HuginError::CacheEntryCorrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "treating corrupt cache entry as a miss");
                metrics::counter!(telemetry::CACHE_CORRUPT_ENTRIES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Persist `response` for `prompt`.
    ///
    /// Returns true if the entry was written. The file is written to a
    /// temporary sibling and renamed into place while the lock is held, so
    /// readers never see a partial entry.
    pub fn write(&self, prompt: &Value, response: &Value) -> bool {
        let path = self.entry_path(prompt);
        let entry = CacheEntry {
            request: CachedRequest {
                prompt: prompt.clone(),
                params: self.params(),
            },
            response: response.clone(),
        };
        let content = match serde_json::to_string_pretty(&entry) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to serialize cache entry");
                return false;
            }
        };

        let _guard = match self.lock.acquire(self.lock_timeout) {
            Ok(guard) => guard,
            Err(e) => {
                self.log_lock_failure(&e, &path);
                return false;
            }
        };

        match persist(&path, content.as_bytes()) {
            Ok(()) => {
                debug!(path = %path.display(), "cache entry written");
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to write cache entry");
                false
            }
        }
    }

    /// Remove the entry for `prompt`. A missing entry is not an error.
    ///
    /// Returns true if a file was removed.
    pub fn delete(&self, prompt: &Value) -> bool {
        let path = self.entry_path(prompt);

        let _guard = match self.lock.acquire(self.lock_timeout) {
            Ok(guard) => guard,
            Err(e) => {
                self.log_lock_failure(&e, &path);
                return false;
            }
        };

        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to delete cache entry");
                false
            }
        }
    }

    fn log_lock_failure(&self, err: &HuginError, entry: &Path) {
        if matches!(err, HuginError::CacheLockTimeout { .. }) {
            metrics::counter!(telemetry::CACHE_LOCK_TIMEOUTS_TOTAL).increment(1);
        }
        error!(entry = %entry.display(), error = %err, "cache root locked");
    }
}

fn persist(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
