use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::PluginError;
use super::manifest::{BundleDescriptor, BundleManifest};
use crate::identifier;
use crate::resource::BundleArchive;

pub const BUNDLE_EXTENSION: &str = "zip";

/// Why a candidate never made it into the load set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Unpacked bundles are not supported.
    Directory,
    Unreadable(String),
    MissingDescriptor,
    InvalidDescriptor(String),
    MissingIdentity,
    InvalidIdentity(String),
    MissingHostDependency { host: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directories are not supported as bundles"),
            Self::Unreadable(e) => write!(f, "archive could not be read: {e}"),
            Self::MissingDescriptor => write!(f, "no bundle descriptor"),
            Self::InvalidDescriptor(e) => write!(f, "invalid bundle descriptor: {e}"),
            Self::MissingIdentity => write!(f, "descriptor declares no identity"),
            Self::InvalidIdentity(id) => {
                write!(f, "identity '{id}' is not a valid namespace")
            }
            Self::MissingHostDependency { host } => {
                write!(f, "does not declare a dependency on '{host}'")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBundle {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of scanning the bundle directory.
#[derive(Debug, Default)]
pub struct BundleScan {
    pub accepted: Vec<BundleDescriptor>,
    pub skipped: Vec<SkippedBundle>,
}

pub struct BundleDiscovery;

impl BundleDiscovery {
    /// Lists `dir` (non-recursively, creating it if absent) and keeps the
    /// archives that declare an identity and depend on `host_id`.
    ///
    /// Problems with individual bundles are logged and recorded in
    /// [`BundleScan::skipped`]; only failing to read `dir` itself is an error.
    pub fn scan(dir: &Path, host_id: &str) -> Result<BundleScan, PluginError> {
        std::fs::create_dir_all(dir)?;

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            candidates.push(entry?.path());
        }
        candidates.sort();

        let mut scan = BundleScan::default();
        for path in candidates {
            if path.is_dir() {
                Self::skip(&mut scan, path, SkipReason::Directory);
                continue;
            }
            if !Self::is_bundle_file(&path) {
                tracing::debug!(path = %path.display(), "Ignoring non-bundle file");
                continue;
            }
            match Self::inspect(&path, host_id) {
                Ok(descriptor) => {
                    tracing::debug!(
                        bundle = %descriptor.id(),
                        path = %path.display(),
                        "Accepted bundle"
                    );
                    scan.accepted.push(descriptor);
                }
                Err(reason) => Self::skip(&mut scan, path, reason),
            }
        }

        Ok(scan)
    }

    fn is_bundle_file(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(BUNDLE_EXTENSION))
    }

    fn inspect(path: &Path, host_id: &str) -> Result<BundleDescriptor, SkipReason> {
        let archive =
            BundleArchive::open(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let manifest = BundleManifest::load(&archive).map_err(|e| match e {
            PluginError::ManifestNotFound { .. } => SkipReason::MissingDescriptor,
            PluginError::InvalidManifest { reason, .. } => SkipReason::InvalidDescriptor(reason),
            other => SkipReason::Unreadable(other.to_string()),
        })?;

        let id = manifest.id.clone().ok_or(SkipReason::MissingIdentity)?;
        if !identifier::is_valid_namespace(&id) {
            return Err(SkipReason::InvalidIdentity(id));
        }
        if !manifest.requires(host_id) {
            return Err(SkipReason::MissingHostDependency {
                host: host_id.to_string(),
            });
        }

        Ok(BundleDescriptor::new(id, manifest, Arc::new(archive)))
    }

    fn skip(scan: &mut BundleScan, path: PathBuf, reason: SkipReason) {
        tracing::warn!(path = %path.display(), reason = %reason, "Skipping bundle");
        scan.skipped.push(SkippedBundle { path, reason });
    }
}
