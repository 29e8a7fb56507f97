use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::PluginError;
use crate::resource::BundleArchive;

pub const MANIFEST_FILE: &str = "bundle.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Contents of `bundle.json`.
///
/// `id` is optional here so that a bundle without one is reported as a skip
/// rather than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<BundleAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Service contract name to implementation names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provides: BTreeMap<String, Vec<String>>,
}

impl BundleManifest {
    /// Reads the descriptor from an opened archive without running any of its code.
    pub fn load(archive: &BundleArchive) -> Result<Self, PluginError> {
        if !archive.is_file(MANIFEST_FILE) {
            return Err(PluginError::ManifestNotFound {
                path: archive.path().to_path_buf(),
            });
        }
        let content = archive.read(MANIFEST_FILE)?;
        serde_json::from_slice(&content).map_err(|e| PluginError::InvalidManifest {
            path: archive.path().to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn requires(&self, identity: &str) -> bool {
        self.requires.iter().any(|r| r == identity)
    }
}

/// An accepted bundle: a manifest with a validated identity plus its archive.
#[derive(Debug, Clone)]
pub struct BundleDescriptor {
    pub(crate) id: String,
    pub(crate) manifest: BundleManifest,
    pub(crate) archive: Arc<BundleArchive>,
}

impl BundleDescriptor {
    pub(crate) fn new(id: String, manifest: BundleManifest, archive: Arc<BundleArchive>) -> Self {
        Self {
            id,
            manifest,
            archive,
        }
    }

    /// Bundle identity; also the namespace its resources live under.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub fn archive(&self) -> &Arc<BundleArchive> {
        &self.archive
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn dependencies(&self) -> &[String] {
        &self.manifest.requires
    }

    /// Implementation names this bundle declares for `contract`.
    pub fn provides(&self, contract: &str) -> &[String] {
        self.manifest
            .provides
            .get(contract)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
