//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust
//! use plugin_host::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

// Loading
pub use crate::config::LoaderConfig;
pub use crate::plugins::{
    BoxError, LoadReport, LoggingProgress, NoProgress, Plugin, PluginLoader, PluginService,
    ProgressObserver, ServiceCatalog, ServiceContract,
};

// Resources
pub use crate::identifier::Identifier;
pub use crate::resource::{Location, ResourceManager, ResourceProvider};
