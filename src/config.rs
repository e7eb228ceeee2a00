//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (if provided)
//! 2. `~/.hugin/config.toml` (user)
//! 3. `/etc/hugin/config.toml` (system)
//!
//! ```toml
//! [cache]
//! base_dir = "/var/cache/hugin"
//! lock_timeout_ms = 5000
//! blacklist = ["api_key"]
//!
//! [service]
//! model_category = "openspg"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheConfig, DEFAULT_BLACKLIST, DEFAULT_LOCK_TIMEOUT};
use crate::{HuginError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub service: ServiceSection,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Base directory for default cache roots (default: `<cwd>/.cache`).
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Lock acquisition timeout in milliseconds (default: 5000).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Fields excluded from cache keys and persisted params.
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            base_dir: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            blacklist: default_blacklist(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}

fn default_blacklist() -> Vec<String> {
    DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect()
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Prefix of every model id served, as in `<category>/<project>`
    /// (default: `openspg`).
    #[serde(default = "default_model_category")]
    pub model_category: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            model_category: default_model_category(),
        }
    }
}

fn default_model_category() -> String {
    "openspg".to_string()
}

impl CacheSection {
    /// Cache settings in the form the store consumes.
    pub fn to_cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new()
            .lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .blacklist(self.blacklist.iter().cloned());
        if let Some(dir) = &self.base_dir {
            config = config.base_dir(dir.clone());
        }
        config
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.hugin/config.toml`
    /// 3. `/etc/hugin/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            HuginError::Configuration(msg) => {
                HuginError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hugin").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/hugin/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginError::Configuration(
            "No config file found. Create ~/.hugin/config.toml or /etc/hugin/config.toml"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.cache.lock_timeout_ms, 5000);
        assert_eq!(config.cache.blacklist, vec!["api_key".to_string()]);
        assert!(config.cache.base_dir.is_none());
        assert_eq!(config.service.model_category, "openspg");
    }

    #[test]
    fn parse_minimal_config() {
        let config = Config::parse(
            r#"
            [cache]
            base_dir = "/var/cache/hugin"
        "#,
        )
        .unwrap();
        assert_eq!(
            config.cache.base_dir.as_deref(),
            Some(Path::new("/var/cache/hugin"))
        );
        // Defaults preserved
        assert_eq!(config.cache.lock_timeout_ms, 5000);
        assert_eq!(config.service.model_category, "openspg");
    }

    #[test]
    fn cache_section_converts() {
        let config = Config::parse(
            r#"
            [cache]
            lock_timeout_ms = 250
            blacklist = ["api_key", "token"]
        "#,
        )
        .unwrap();
        let cache = config.cache.to_cache_config();
        assert_eq!(cache.lock_timeout, Duration::from_millis(250));
        assert_eq!(cache.blacklist, vec!["api_key", "token"]);
        assert!(cache.base_dir.is_none());
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let result = Config::parse("[cache\nbase_dir = 1");
        assert!(matches!(result, Err(HuginError::Configuration(_))));
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let result = Config::load(Some(Path::new("/nonexistent/hugin.toml")));
        assert!(matches!(result, Err(HuginError::Configuration(_))));
    }
}
