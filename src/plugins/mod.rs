//! Plugin discovery, isolation and concurrent initialization.
//!
//! Bundles are `.zip` archives in a flat plugins directory, each with a
//! `bundle.json` descriptor at its root. Code is linked into the host and
//! registered in a [`ServiceCatalog`]; a bundle activates implementations by
//! naming them under `provides`.
//!
//! # Bundle Structure
//!
//! ```text
//! plugins/
//! └── greeter.zip
//!     ├── bundle.json
//!     └── res/
//!         └── greeter/
//!             └── lang/
//!                 └── en_us.json
//! ```
//!
//! ```json
//! {
//!   "id": "greeter",
//!   "version": "1.0.0",
//!   "requires": ["launcher"],
//!   "provides": { "plugin": ["greeter::Greeter"] }
//! }
//! ```

mod context;
mod discovery;
mod error;
mod loader;
mod manifest;
mod progress;
mod services;
mod wrapper;

pub use context::{LoadContext, ServiceBinding, Services};
pub use discovery::{BUNDLE_EXTENSION, BundleDiscovery, BundleScan, SkipReason, SkippedBundle};
pub use error::PluginError;
pub use loader::{InitFailure, LoadReport, PluginLoader};
pub use manifest::{BundleAuthor, BundleDescriptor, BundleManifest, MANIFEST_FILE};
pub use progress::{LoggingProgress, NoProgress, ProgressObserver};
pub use services::{PluginService, ServiceCatalog, ServiceContract};
pub use wrapper::{PluginState, PluginWrapper};

use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An extension loaded from a bundle.
///
/// `id` must be stable across runs. `init` runs once, on a worker thread,
/// concurrently with other plugins' `init`.
pub trait Plugin: Send + Sync + 'static {
    fn id(&self) -> Uuid;

    fn init(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
