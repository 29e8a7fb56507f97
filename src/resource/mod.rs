//! Uniform, namespaced view of files contributed by the host and by plugins.
//!
//! Every namespace is owned by exactly one [`ResourceProvider`]. Providers
//! map an [`Identifier`] to a [`Location`] without checking that anything is
//! there; the [`ResourceManager`] layers existence checks and cross-namespace
//! queries on top.
//!
//! ```text
//! demo_plugin.zip
//! ├── bundle.json
//! └── res/
//!     └── demo_plugin/
//!         └── lang/
//!             └── en_us.json      <- demo_plugin:lang/en_us.json
//! ```

mod archive;
mod directory;
mod error;
mod location;
mod manager;

pub use archive::{ArchiveResourceProvider, BundleArchive, RESOURCE_ROOT};
pub use directory::DirectoryResourceProvider;
pub use error::ResourceError;
pub use location::Location;
pub use manager::{Matching, ResourceManager};

use crate::identifier::Identifier;

/// Maps identifiers of a single namespace to locations.
///
/// Implementations must be immutable once constructed: the manager shares
/// them across threads without further locking.
pub trait ResourceProvider: Send + Sync {
    fn namespace(&self) -> &str;

    /// Must not check existence.
    fn resolve(&self, identifier: &Identifier) -> Location;
}
