use std::path::{Path, PathBuf};

use super::{Location, ResourceProvider};
use crate::identifier::Identifier;

/// Serves a namespace from an on-disk directory laid out as
/// `<root>/<namespace>/<path>`, e.g. host resources installed next to the
/// executable.
#[derive(Debug, Clone)]
pub struct DirectoryResourceProvider {
    namespace: String,
    root: PathBuf,
}

impl DirectoryResourceProvider {
    pub fn new(namespace: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceProvider for DirectoryResourceProvider {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resolve(&self, identifier: &Identifier) -> Location {
        let mut path = self.root.join(identifier.namespace());
        for segment in identifier.path().split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Location::filesystem(path)
    }
}
