//! Environment variable overrides for [`LoaderConfig`].
//!
//! Each field maps to `LAUNCHER_<FIELD>` (for example `LAUNCHER_THREAD_COUNT`).
//! Variables are read, never written.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, LoaderConfig};

pub const ENV_PREFIX: &str = "LAUNCHER_";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvOverrides {
    prefix: String,
    lookup: Lookup,
}

impl EnvOverrides {
    /// Reads the process environment with the default prefix.
    pub fn new() -> Self {
        Self::prefixed(ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Uses `lookup` instead of the process environment.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    /// Get the full environment variable name
    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&self.env_key(key)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: self.env_key(key),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Returns `config` with every variable that is set applied on top.
    pub fn apply(&self, mut config: LoaderConfig) -> ConfigResult<LoaderConfig> {
        if let Some(dir) = self.get("plugins_dir") {
            config.plugins_dir = PathBuf::from(dir);
        }
        if let Some(host_id) = self.get("host_id") {
            config.host_id = host_id;
        }
        if let Some(count) = self.parse::<usize>("thread_count")? {
            config.thread_count = count;
        }
        if let Some(raw) = self.get("init_timeout_secs") {
            config.init_timeout_secs = match raw.trim() {
                "none" | "off" => None,
                value => Some(value.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        key: self.env_key("init_timeout_secs"),
                        message: e.to_string(),
                    }
                })?),
            };
        }
        if let Some(level) = self.get("log_level") {
            config.log_level = level;
        }
        Ok(config)
    }
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvOverrides")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn overrides(vars: &[(&str, &str)]) -> EnvOverrides {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvOverrides::new().with_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_key_conversion() {
        let env = EnvOverrides::new();
        assert_eq!(env.env_key("thread_count"), "LAUNCHER_THREAD_COUNT");

        let env = EnvOverrides::prefixed("APP_");
        assert_eq!(env.env_key("plugins_dir"), "APP_PLUGINS_DIR");
    }

    #[test]
    fn test_apply_overrides() {
        let env = overrides(&[
            ("LAUNCHER_PLUGINS_DIR", "/srv/plugins"),
            ("LAUNCHER_THREAD_COUNT", " 6 "),
            ("LAUNCHER_INIT_TIMEOUT_SECS", "15"),
            ("LAUNCHER_LOG_LEVEL", "debug"),
        ]);

        let config = env.apply(LoaderConfig::default()).unwrap();
        assert_eq!(config.plugins_dir, PathBuf::from("/srv/plugins"));
        assert_eq!(config.thread_count, 6);
        assert_eq!(config.init_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.host_id, "launcher");
    }

    #[test]
    fn test_apply_nothing_set() {
        let config = overrides(&[]).apply(LoaderConfig::default()).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_disable_timeout() {
        let env = overrides(&[("LAUNCHER_INIT_TIMEOUT_SECS", "none")]);
        let config = env.apply(LoaderConfig::default()).unwrap();
        assert_eq!(config.init_timeout(), None);
    }

    #[test]
    fn test_invalid_number() {
        let env = overrides(&[("LAUNCHER_THREAD_COUNT", "many")]);
        match env.apply(LoaderConfig::default()).unwrap_err() {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "LAUNCHER_THREAD_COUNT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_value_ignored() {
        let env = overrides(&[("LAUNCHER_HOST_ID", "  ")]);
        let config = env.apply(LoaderConfig::default()).unwrap();
        assert_eq!(config.host_id, "launcher");
    }
}
