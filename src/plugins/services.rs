//! Service contracts and the host's catalog of linked implementations.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Plugin;

/// A named interface that bundles can provide implementations of.
///
/// `NAME` is the key used under `provides` in `bundle.json`.
pub trait ServiceContract: 'static {
    const NAME: &'static str;
    type Service: ?Sized + Send + Sync + 'static;
}

/// The built-in `plugin` contract.
pub struct PluginService;

impl ServiceContract for PluginService {
    const NAME: &'static str = "plugin";
    type Service = dyn Plugin;
}

type Factory = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Implementations linked into the host, keyed by contract and implementation
/// name. A bundle can only activate entries it names in its descriptor.
#[derive(Default, Clone)]
pub struct ServiceCatalog {
    factories: BTreeMap<(String, String), Factory>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` as implementation `implementation` of contract `C`.
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register<C, F>(&mut self, implementation: impl Into<String>, factory: F) -> &mut Self
    where
        C: ServiceContract,
        F: Fn() -> Arc<C::Service> + Send + Sync + 'static,
    {
        let implementation = implementation.into();
        let erased: Factory = Arc::new(move || Box::new(factory()) as Box<dyn Any + Send + Sync>);
        if self
            .factories
            .insert((C::NAME.to_string(), implementation.clone()), erased)
            .is_some()
        {
            tracing::warn!(
                contract = C::NAME,
                implementation = %implementation,
                "Replacing previously registered implementation"
            );
        }
        self
    }

    pub fn contains(&self, contract: &str, implementation: &str) -> bool {
        self.factories
            .contains_key(&(contract.to_string(), implementation.to_string()))
    }

    /// Creates a fresh instance of `implementation`, or `None` if it is not
    /// registered under `C`.
    pub fn instantiate<C: ServiceContract>(&self, implementation: &str) -> Option<Arc<C::Service>> {
        let factory = self
            .factories
            .get(&(C::NAME.to_string(), implementation.to_string()))?;
        factory().downcast::<Arc<C::Service>>().ok().map(|b| *b)
    }

    /// Implementation names registered under `contract`, sorted.
    pub fn implementations(&self, contract: &str) -> Vec<&str> {
        self.factories
            .keys()
            .filter(|(c, _)| c == contract)
            .map(|(_, i)| i.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("entries", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
