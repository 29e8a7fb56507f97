//! Load-set resolution.
//!
//! A [`LoadContext`] is built once from the accepted bundles and never
//! changes afterwards. It fixes the dependency order of the bundles and binds
//! every implementation a bundle declares under `provides` to the host's
//! [`ServiceCatalog`]. Contract queries only ever see those bindings.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::PluginError;
use super::manifest::BundleDescriptor;
use super::services::{ServiceCatalog, ServiceContract};

/// One implementation activated by one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub contract: String,
    pub implementation: String,
    pub bundle: String,
}

pub struct LoadContext {
    host_id: String,
    bundles: Vec<BundleDescriptor>,
    bindings: BTreeMap<String, Vec<ServiceBinding>>,
    catalog: Arc<ServiceCatalog>,
}

impl LoadContext {
    /// Resolves `bundles` against the host identity and catalog.
    ///
    /// Fails with [`PluginError::LoadSetUnresolvable`] when identities clash,
    /// a dependency is unknown or cyclic, or a declared implementation cannot
    /// be bound.
    pub fn resolve(
        host_id: &str,
        bundles: Vec<BundleDescriptor>,
        catalog: Arc<ServiceCatalog>,
    ) -> Result<Self, PluginError> {
        let mut by_id: BTreeMap<String, BundleDescriptor> = BTreeMap::new();
        for bundle in bundles {
            if bundle.id() == host_id {
                return Err(PluginError::unresolvable(format!(
                    "bundle at {} claims the host identity '{host_id}'",
                    bundle.path().display()
                )));
            }
            if let Some(existing) = by_id.get(bundle.id()) {
                return Err(PluginError::unresolvable(format!(
                    "identity '{}' is declared by both {} and {}",
                    bundle.id(),
                    existing.path().display(),
                    bundle.path().display()
                )));
            }
            by_id.insert(bundle.id().to_string(), bundle);
        }

        let order = Self::dependency_order(host_id, &by_id)?;
        let bundles: Vec<BundleDescriptor> = order
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let bindings = Self::bind_services(&bundles, &catalog)?;

        tracing::debug!(
            bundles = bundles.len(),
            contracts = bindings.len(),
            "Resolved load context"
        );

        Ok(Self {
            host_id: host_id.to_string(),
            bundles,
            bindings,
            catalog,
        })
    }

    /// Kahn's algorithm over bundle dependencies; the host is an implicit root.
    fn dependency_order(
        host_id: &str,
        bundles: &BTreeMap<String, BundleDescriptor>,
    ) -> Result<Vec<String>, PluginError> {
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

        for (id, bundle) in bundles {
            in_degree.entry(id.as_str()).or_insert(0);
            for dep in bundle.dependencies() {
                if dep == host_id {
                    continue;
                }
                if !bundles.contains_key(dep) {
                    return Err(PluginError::unresolvable(format!(
                        "bundle '{id}' requires '{dep}' which is not loaded"
                    )));
                }
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
                *in_degree.entry(id.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, d)| *d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(bundles.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(next) = dependents.get(id) {
                for dependent in next {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() != bundles.len() {
            let remaining: Vec<&str> = in_degree
                .iter()
                .filter(|&(_, d)| *d > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(PluginError::unresolvable(format!(
                "circular dependency among bundles: {remaining:?}"
            )));
        }

        Ok(order)
    }

    fn bind_services(
        bundles: &[BundleDescriptor],
        catalog: &ServiceCatalog,
    ) -> Result<BTreeMap<String, Vec<ServiceBinding>>, PluginError> {
        let mut bindings: BTreeMap<String, Vec<ServiceBinding>> = BTreeMap::new();
        let mut owners: HashMap<(&str, &str), &str> = HashMap::new();

        for bundle in bundles {
            for (contract, implementations) in &bundle.manifest().provides {
                for implementation in implementations {
                    if !catalog.contains(contract, implementation) {
                        return Err(PluginError::unresolvable(format!(
                            "bundle '{}' provides '{implementation}' for '{contract}', \
                             which the host does not link",
                            bundle.id()
                        )));
                    }
                    let key = (contract.as_str(), implementation.as_str());
                    if let Some(owner) = owners.insert(key, bundle.id()) {
                        return Err(PluginError::unresolvable(format!(
                            "'{implementation}' for '{contract}' is provided by both \
                             '{owner}' and '{}'",
                            bundle.id()
                        )));
                    }
                    bindings
                        .entry(contract.clone())
                        .or_default()
                        .push(ServiceBinding {
                            contract: contract.clone(),
                            implementation: implementation.clone(),
                            bundle: bundle.id().to_string(),
                        });
                }
            }
        }

        Ok(bindings)
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Bundles in dependency order.
    pub fn bundles(&self) -> &[BundleDescriptor] {
        &self.bundles
    }

    pub fn bundle(&self, id: &str) -> Option<&BundleDescriptor> {
        self.bundles.iter().find(|b| b.id() == id)
    }

    pub fn load_order(&self) -> Vec<&str> {
        self.bundles.iter().map(|b| b.id()).collect()
    }

    /// Bindings for `contract`, in bundle load order.
    pub fn bindings(&self, contract: &str) -> &[ServiceBinding] {
        self.bindings
            .get(contract)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Creates a fresh instance for `binding`.
    pub fn instantiate<C: ServiceContract>(
        &self,
        binding: &ServiceBinding,
    ) -> Option<Arc<C::Service>> {
        if binding.contract != C::NAME {
            return None;
        }
        self.catalog.instantiate::<C>(&binding.implementation)
    }

    /// Every implementation of `C` in this context. Each call yields fresh
    /// instances.
    pub fn services<C: ServiceContract>(&self) -> Services<'_, C> {
        Services {
            catalog: Some(&self.catalog),
            bindings: self.bindings(C::NAME).iter(),
            _contract: PhantomData,
        }
    }
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("host_id", &self.host_id)
            .field("bundles", &self.load_order())
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Lazy iterator over the implementations of one contract.
pub struct Services<'a, C: ServiceContract> {
    catalog: Option<&'a ServiceCatalog>,
    bindings: std::slice::Iter<'a, ServiceBinding>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: ServiceContract> Services<'_, C> {
    pub(crate) fn empty() -> Self {
        Self {
            catalog: None,
            bindings: [].iter(),
            _contract: PhantomData,
        }
    }
}

impl<C: ServiceContract> Iterator for Services<'_, C> {
    type Item = Arc<C::Service>;

    fn next(&mut self) -> Option<Self::Item> {
        let catalog = self.catalog?;
        for binding in self.bindings.by_ref() {
            if let Some(service) = catalog.instantiate::<C>(&binding.implementation) {
                return Some(service);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.bindings.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest::BundleManifest;
    use crate::plugins::services::PluginService;
    use crate::plugins::Plugin;
    use crate::resource::BundleArchive;
    use crate::testing::helpers::write_archive;
    use tempfile::TempDir;
    use uuid::Uuid;

    const HOST: &str = "launcher";

    struct Fixed(Uuid);

    impl Plugin for Fixed {
        fn id(&self) -> Uuid {
            self.0
        }
    }

    struct Fixture {
        dir: TempDir,
        catalog: ServiceCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            let mut catalog = ServiceCatalog::new();
            for name in ["a::Plugin", "b::Plugin", "c::Plugin"] {
                catalog.register::<PluginService, _>(name, || Arc::new(Fixed(Uuid::new_v4())));
            }
            Self {
                dir: tempfile::tempdir().unwrap(),
                catalog,
            }
        }

        fn bundle(&self, file: &str, id: &str, requires: &[&str], plugins: &[&str]) -> BundleDescriptor {
            let path = write_archive(&self.dir.path().join(file), &[("bundle.json", b"{}".as_slice())]);
            let manifest = BundleManifest {
                id: Some(id.into()),
                requires: requires.iter().map(|s| s.to_string()).collect(),
                provides: BTreeMap::from([(
                    "plugin".to_string(),
                    plugins.iter().map(|s| s.to_string()).collect(),
                )]),
                ..Default::default()
            };
            BundleDescriptor::new(
                id.into(),
                manifest,
                Arc::new(BundleArchive::open(path).unwrap()),
            )
        }

        fn resolve(self, bundles: Vec<BundleDescriptor>) -> Result<LoadContext, PluginError> {
            LoadContext::resolve(HOST, bundles, Arc::new(self.catalog))
        }
    }

    fn reason(err: PluginError) -> String {
        match err {
            PluginError::LoadSetUnresolvable { reason } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_dependency_order() {
        let fx = Fixture::new();
        let bundles = vec![
            fx.bundle("c.zip", "c", &[HOST, "b"], &["c::Plugin"]),
            fx.bundle("a.zip", "a", &[HOST], &["a::Plugin"]),
            fx.bundle("b.zip", "b", &[HOST, "a"], &["b::Plugin"]),
        ];

        let ctx = fx.resolve(bundles).unwrap();
        assert_eq!(ctx.host_id(), HOST);
        assert_eq!(ctx.load_order(), vec!["a", "b", "c"]);
        let owners: Vec<&str> = ctx
            .bindings("plugin")
            .iter()
            .map(|b| b.bundle.as_str())
            .collect();
        assert_eq!(owners, vec!["a", "b", "c"]);
        assert!(ctx.bundle("b").is_some());
        assert!(ctx.bundle("launcher").is_none());
    }

    #[test]
    fn test_services_are_lazy_and_restartable() {
        let fx = Fixture::new();
        let bundles = vec![
            fx.bundle("a.zip", "a", &[HOST], &["a::Plugin"]),
            fx.bundle("b.zip", "b", &[HOST], &["b::Plugin"]),
        ];
        let ctx = fx.resolve(bundles).unwrap();

        let first: Vec<Uuid> = ctx.services::<PluginService>().map(|p| p.id()).collect();
        let second: Vec<Uuid> = ctx.services::<PluginService>().map(|p| p.id()).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_undeclared_implementation_is_not_visible() {
        let fx = Fixture::new();
        let bundles = vec![fx.bundle("a.zip", "a", &[HOST], &["a::Plugin"])];
        let ctx = fx.resolve(bundles).unwrap();

        assert_eq!(ctx.services::<PluginService>().count(), 1);
        assert_eq!(ctx.bindings("plugin")[0].implementation, "a::Plugin");
    }

    #[test]
    fn test_duplicate_identity_fails() {
        let fx = Fixture::new();
        let bundles = vec![
            fx.bundle("one.zip", "same", &[HOST], &[]),
            fx.bundle("two.zip", "same", &[HOST], &[]),
        ];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("same"));
    }

    #[test]
    fn test_host_identity_claim_fails() {
        let fx = Fixture::new();
        let bundles = vec![fx.bundle("host.zip", HOST, &[HOST], &[])];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("host identity"));
    }

    #[test]
    fn test_unknown_dependency_fails() {
        let fx = Fixture::new();
        let bundles = vec![fx.bundle("a.zip", "a", &[HOST, "missing"], &[])];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_cycle_fails() {
        let fx = Fixture::new();
        let bundles = vec![
            fx.bundle("a.zip", "a", &[HOST, "b"], &[]),
            fx.bundle("b.zip", "b", &[HOST, "a"], &[]),
        ];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("circular"));
    }

    #[test]
    fn test_unlinked_implementation_fails() {
        let fx = Fixture::new();
        let bundles = vec![fx.bundle("a.zip", "a", &[HOST], &["nowhere::Plugin"])];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("nowhere::Plugin"));
    }

    #[test]
    fn test_implementation_claimed_twice_fails() {
        let fx = Fixture::new();
        let bundles = vec![
            fx.bundle("a.zip", "a", &[HOST], &["a::Plugin"]),
            fx.bundle("b.zip", "b", &[HOST], &["a::Plugin"]),
        ];
        let msg = reason(fx.resolve(bundles).unwrap_err());
        assert!(msg.contains("provided by both"));
    }

    #[test]
    fn test_empty_services() {
        let services = Services::<PluginService>::empty();
        assert_eq!(services.count(), 0);
    }
}
