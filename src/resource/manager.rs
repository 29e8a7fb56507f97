//! Process-wide namespace registry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::vec;

use super::{Location, ResourceError, ResourceProvider};
use crate::identifier::{self, Identifier};

type ProviderRef = Arc<dyn ResourceProvider>;

/// Registry of resource providers keyed by namespace.
///
/// Registration is add-only. Reads take the shared lock only long enough to
/// look up or snapshot providers; existence checks run outside it.
#[derive(Default)]
pub struct ResourceManager {
    providers: RwLock<BTreeMap<String, ProviderRef>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&self, provider: ProviderRef) -> Result<(), ResourceError> {
        let namespace = provider.namespace().to_string();
        if !identifier::is_valid_namespace(&namespace) {
            return Err(ResourceError::InvalidNamespace { namespace });
        }

        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(&namespace) {
            return Err(ResourceError::DuplicateNamespace { namespace });
        }
        tracing::debug!(namespace = %namespace, "Registered resource provider");
        providers.insert(namespace, provider);
        Ok(())
    }

    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps an identifier to its location. The location may not exist.
    pub fn resolve(&self, identifier: &Identifier) -> Result<Location, ResourceError> {
        let provider = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier.namespace())
            .cloned()
            .ok_or_else(|| ResourceError::UnknownNamespace {
                namespace: identifier.namespace().to_string(),
            })?;
        Ok(provider.resolve(identifier))
    }

    pub fn resolve_existing(&self, identifier: &Identifier) -> Result<Location, ResourceError> {
        let location = self.resolve(identifier)?;
        if !location.exists() {
            return Err(ResourceError::NotFound {
                identifier: identifier.clone(),
                reason: "does not exist",
            });
        }
        Ok(location)
    }

    pub fn resolve_file(&self, identifier: &Identifier) -> Result<Location, ResourceError> {
        let location = self.resolve(identifier)?;
        if !location.is_file() {
            return Err(ResourceError::NotFound {
                identifier: identifier.clone(),
                reason: "not a file",
            });
        }
        Ok(location)
    }

    pub fn resolve_directory(&self, identifier: &Identifier) -> Result<Location, ResourceError> {
        let location = self.resolve(identifier)?;
        if !location.is_dir() {
            return Err(ResourceError::NotFound {
                identifier: identifier.clone(),
                reason: "not a directory",
            });
        }
        Ok(location)
    }

    pub fn read(&self, identifier: &Identifier) -> Result<Vec<u8>, ResourceError> {
        Ok(self.resolve_file(identifier)?.read()?)
    }

    pub fn read_to_string(&self, identifier: &Identifier) -> Result<String, ResourceError> {
        Ok(self.resolve_file(identifier)?.read_to_string()?)
    }

    /// Every existing location of `path` across all registered namespaces.
    ///
    /// The iterator works on a snapshot of the registry taken by this call, in
    /// namespace order. Call again to observe later registrations.
    pub fn matching(&self, path: &str) -> Result<Matching, ResourceError> {
        self.matches(path, MatchKind::Any)
    }

    pub fn files(&self, path: &str) -> Result<Matching, ResourceError> {
        self.matches(path, MatchKind::File)
    }

    pub fn directories(&self, path: &str) -> Result<Matching, ResourceError> {
        self.matches(path, MatchKind::Directory)
    }

    pub fn matching_namespaces(&self, path: &str) -> Result<BTreeSet<String>, ResourceError> {
        let mut matches = self.matches(path, MatchKind::Any)?;
        let mut namespaces = BTreeSet::new();
        while let Some((namespace, _)) = matches.next_with_namespace() {
            namespaces.insert(namespace);
        }
        Ok(namespaces)
    }

    fn matches(&self, path: &str, kind: MatchKind) -> Result<Matching, ResourceError> {
        if !identifier::is_valid_path(path) {
            return Err(ResourceError::MalformedIdentifier {
                input: path.to_string(),
                reason: format!("path '{path}' may only contain [a-z0-9_/.]"),
            });
        }

        let snapshot: Vec<(String, ProviderRef)> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(namespace, provider)| (namespace.clone(), Arc::clone(provider)))
            .collect();

        Ok(Matching {
            providers: snapshot.into_iter(),
            path: path.to_string(),
            kind,
        })
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum MatchKind {
    Any,
    File,
    Directory,
}

/// Lazy iterator returned by [`ResourceManager::matching`] and friends.
pub struct Matching {
    providers: vec::IntoIter<(String, ProviderRef)>,
    path: String,
    kind: MatchKind,
}

impl Matching {
    fn next_with_namespace(&mut self) -> Option<(String, Location)> {
        for (namespace, provider) in self.providers.by_ref() {
            let Ok(identifier) = Identifier::new(namespace.as_str(), self.path.as_str()) else {
                continue;
            };
            let location = provider.resolve(&identifier);
            let keep = match self.kind {
                MatchKind::Any => location.exists(),
                MatchKind::File => location.is_file(),
                MatchKind::Directory => location.is_dir(),
            };
            if keep {
                return Some((namespace, location));
            }
        }
        None
    }
}

impl Iterator for Matching {
    type Item = Location;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_namespace().map(|(_, location)| location)
    }
}
