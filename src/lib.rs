//! # plugin-host
//!
//! Discovers extension bundles, resolves them into one isolated load context,
//! initializes their plugins concurrently and exposes a namespaced view of
//! the files they ship.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugin_host::{LoaderConfig, LoggingProgress, PluginLoader, ResourceManager, ServiceCatalog};
//! use plugin_host::resource::DirectoryResourceProvider;
//!
//! fn main() -> Result<(), plugin_host::Error> {
//!     let config = LoaderConfig::load("configuration.json")?;
//!
//!     let resources = Arc::new(ResourceManager::new());
//!     resources.register_provider(Arc::new(DirectoryResourceProvider::new("launcher", "assets")))?;
//!
//!     let catalog = ServiceCatalog::new();
//!     let loader = PluginLoader::new(config, catalog, Arc::clone(&resources))?;
//!     let report = loader.init(&LoggingProgress::new())?;
//!
//!     for location in resources.matching("lang/en_us.json")? {
//!         println!("{location}");
//!     }
//!     println!("{} plugins ready", report.plugin_count);
//!     Ok(())
//! }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod identifier;
pub mod observability;
pub mod plugins;
pub mod prelude;
pub mod resource;
pub mod worker;

mod testing;

pub use config::{ConfigError, EnvOverrides, LoaderConfig};
pub use identifier::Identifier;
pub use observability::{TracingConfig, TracingLevel, init_tracing};
pub use plugins::{
    BoxError, LoadContext, LoadReport, LoggingProgress, NoProgress, Plugin, PluginError,
    PluginLoader, PluginService, PluginState, PluginWrapper, ProgressObserver, ServiceCatalog,
    ServiceContract,
};
pub use resource::{
    ArchiveResourceProvider, DirectoryResourceProvider, Location, ResourceError, ResourceManager,
    ResourceProvider,
};
pub use worker::{JobOutcome, WorkerPool};

/// Error type for plugin-host operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Identifier, namespace registry or resource lookup failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Bundle loading failed as a whole.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Invalid or unreadable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tracing could not be installed.
    #[error(transparent)]
    Observability(#[from] observability::ObservabilityError),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed identifiers, descriptors or lookups of absent resources
    Validation,
    /// Something with the same name or id is already present
    Conflict,
    /// The load set cannot be resolved into one context
    Isolation,
    /// Configuration, layout or calling-context errors
    Configuration,
    /// Internal errors (IO, JSON, archive corruption)
    Internal,
}

fn resource_category(err: &ResourceError) -> ErrorCategory {
    match err {
        ResourceError::MalformedIdentifier { .. }
        | ResourceError::InvalidNamespace { .. }
        | ResourceError::UnknownNamespace { .. }
        | ResourceError::NotFound { .. } => ErrorCategory::Validation,
        ResourceError::DuplicateNamespace { .. } => ErrorCategory::Conflict,
        ResourceError::UnsupportedLayout { .. } => ErrorCategory::Configuration,
        ResourceError::Archive { .. } | ResourceError::Io(_) => ErrorCategory::Internal,
    }
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Resource(e) => resource_category(e),

            Error::Plugin(PluginError::ManifestNotFound { .. })
            | Error::Plugin(PluginError::InvalidManifest { .. }) => ErrorCategory::Validation,
            Error::Plugin(PluginError::DuplicateIdentity { .. })
            | Error::Plugin(PluginError::AlreadyInitialized) => ErrorCategory::Conflict,
            Error::Plugin(PluginError::LoadSetUnresolvable { .. }) => ErrorCategory::Isolation,
            Error::Plugin(PluginError::AsyncContext) | Error::Plugin(PluginError::WorkerPool(_)) => {
                ErrorCategory::Configuration
            }
            Error::Plugin(PluginError::Resource(e)) => resource_category(e),
            Error::Plugin(PluginError::Io(_)) | Error::Plugin(PluginError::Json(_)) => {
                ErrorCategory::Internal
            }

            Error::Config(_) | Error::Observability(_) => ErrorCategory::Configuration,

            Error::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.category() == ErrorCategory::Conflict
    }

    pub fn is_isolation_failure(&self) -> bool {
        self.category() == ErrorCategory::Isolation
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

pub type Result<T> = std::result::Result<T, Error>;
