//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoaderConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parses a level name, falling back to `Info`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "debug" => Self::Debug,
            "trace" | "all" => Self::Trace,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub level: TracingLevel,
    pub with_target: bool,
    pub with_thread_names: bool,
}

impl TracingConfig {
    pub fn new(level: TracingLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn from_loader(config: &LoaderConfig) -> Self {
        Self {
            level: TracingLevel::parse_lenient(&config.log_level),
            with_target: true,
            with_thread_names: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Installs a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), ObservabilityError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names)
        .with_file(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ObservabilityError::Init(e.to_string()))
}
