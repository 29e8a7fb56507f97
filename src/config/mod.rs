//! Loader configuration.
//!
//! ```rust,no_run
//! use plugin_host::config::{EnvOverrides, LoaderConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoaderConfig::load("configuration.json")?;
//! let config = EnvOverrides::new().apply(config)?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

pub mod env;

pub use env::{ENV_PREFIX, EnvOverrides};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier;
use crate::worker::default_thread_count;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Multiple validation errors
    #[error("{0}")]
    ValidationErrors(ValidationErrors),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: ")?;
        let msgs: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_PLUGINS_DIR: &str = "plugins";
pub const DEFAULT_HOST_ID: &str = "launcher";
pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 60;

/// Settings for [`PluginLoader`](crate::plugins::PluginLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory scanned for bundle archives.
    pub plugins_dir: PathBuf,
    /// Identity every bundle must list in `requires`.
    pub host_id: String,
    /// Worker threads used for plugin `init()`.
    pub thread_count: usize,
    /// How long the init barrier waits for one plugin. `None` waits forever.
    pub init_timeout_secs: Option<u64>,
    pub log_level: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from(DEFAULT_PLUGINS_DIR),
            host_id: DEFAULT_HOST_ID.to_string(),
            thread_count: default_thread_count(),
            init_timeout_secs: Some(DEFAULT_INIT_TIMEOUT_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Reads a JSON configuration file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn with_plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = dir.into();
        self
    }

    pub fn with_host_id(mut self, host_id: impl Into<String>) -> Self {
        self.host_id = host_id.into();
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Sets the per-plugin init timeout, rounded up to whole seconds.
    pub fn with_init_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.init_timeout_secs = timeout.map(|t| {
            let secs = t.as_secs() + u64::from(t.subsec_nanos() > 0);
            secs.max(1)
        });
        self
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        if self.thread_count == 0 {
            errors.push(ConfigError::invalid("thread_count", "must be at least 1"));
        }
        if !identifier::is_valid_namespace(&self.host_id) {
            errors.push(ConfigError::invalid(
                "host_id",
                format!("'{}' is not a valid namespace", self.host_id),
            ));
        }
        if self.init_timeout_secs == Some(0) {
            errors.push(ConfigError::invalid(
                "init_timeout_secs",
                "must be positive, or null to wait indefinitely",
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationErrors(ValidationErrors(errors))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("thread_count", "must be at least 1");
        assert!(err.to_string().contains("thread_count"));
    }

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.plugins_dir, PathBuf::from("plugins"));
        assert_eq!(config.host_id, "launcher");
        assert_eq!(config.init_timeout(), Some(Duration::from_secs(60)));
        assert!(config.thread_count >= 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let config = LoaderConfig::load(dir.path().join("configuration.json")).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("configuration.json");
        std::fs::write(
            &path,
            r#"{"plugins_dir": "/opt/app/plugins", "thread_count": 3, "init_timeout_secs": null}"#,
        )
        .unwrap();

        let config = LoaderConfig::load(&path).unwrap();
        assert_eq!(config.plugins_dir, PathBuf::from("/opt/app/plugins"));
        assert_eq!(config.thread_count, 3);
        assert_eq!(config.init_timeout(), None);
        assert_eq!(config.host_id, "launcher");
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("configuration.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            LoaderConfig::load(&path),
            Err(ConfigError::Serialization(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("configuration.json");
        let config = LoaderConfig::default()
            .with_plugins_dir("mods")
            .with_thread_count(4)
            .with_init_timeout(Some(Duration::from_secs(5)));
        config.save(&path).unwrap();

        assert_eq!(LoaderConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_init_timeout_rounds_up() {
        let config = LoaderConfig::default().with_init_timeout(Some(Duration::from_millis(1500)));
        assert_eq!(config.init_timeout(), Some(Duration::from_secs(2)));

        let config = LoaderConfig::default().with_init_timeout(Some(Duration::from_millis(200)));
        assert_eq!(config.init_timeout(), Some(Duration::from_secs(1)));

        let config = LoaderConfig::default().with_init_timeout(Some(Duration::from_secs(3)));
        assert_eq!(config.init_timeout(), Some(Duration::from_secs(3)));

        let config = LoaderConfig::default().with_init_timeout(None);
        assert_eq!(config.init_timeout(), None);
    }

    #[test]
    fn test_validate_collects_errors() {
        let config = LoaderConfig::default()
            .with_thread_count(0)
            .with_host_id("Not-Valid");
        match config.validate().unwrap_err() {
            ConfigError::ValidationErrors(errors) => assert_eq!(errors.0.len(), 2),
            other => panic!("unexpected error: {other}"),
        }

        let config = LoaderConfig::default().with_thread_count(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
