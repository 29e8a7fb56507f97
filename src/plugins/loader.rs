use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use super::context::{LoadContext, Services};
use super::discovery::{BundleDiscovery, SkippedBundle};
use super::progress::ProgressObserver;
use super::services::{PluginService, ServiceCatalog, ServiceContract};
use super::wrapper::{InitTask, PluginWrapper};
use super::{Plugin, PluginError};
use crate::config::LoaderConfig;
use crate::resource::{ArchiveResourceProvider, ResourceManager};
use crate::worker::{self, JobOutcome, WorkerPool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure {
    pub id: Uuid,
    pub bundle: String,
    pub message: String,
}

/// Outcome of [`PluginLoader::init`].
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub plugin_count: usize,
    /// Bundle identities in dependency order.
    pub load_order: Vec<String>,
    pub failures: Vec<InitFailure>,
    pub timed_out: Vec<Uuid>,
    pub skipped: Vec<SkippedBundle>,
    /// Bundle namespaces whose resource provider could not be registered.
    pub unregistered_namespaces: Vec<String>,
}

impl LoadReport {
    /// Every accepted bundle registered and every plugin initialized cleanly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.timed_out.is_empty()
            && self.unregistered_namespaces.is_empty()
    }
}

struct LoadedPlugins {
    context: LoadContext,
    plugins: HashMap<Uuid, Arc<PluginWrapper>>,
    order: Vec<Uuid>,
}

/// Discovers bundles, resolves them into one [`LoadContext`] and initializes
/// their plugins on a worker pool.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use plugin_host::config::LoaderConfig;
/// use plugin_host::plugins::{LoggingProgress, PluginLoader, ServiceCatalog};
/// use plugin_host::resource::ResourceManager;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = ServiceCatalog::new();
/// let resources = Arc::new(ResourceManager::new());
/// let loader = PluginLoader::new(LoaderConfig::default(), catalog, resources)?;
/// let report = loader.init(&LoggingProgress::new())?;
/// println!("{} plugins loaded", report.plugin_count);
/// # Ok(())
/// # }
/// ```
pub struct PluginLoader {
    config: LoaderConfig,
    catalog: Arc<ServiceCatalog>,
    resources: Arc<ResourceManager>,
    pool: WorkerPool,
    started: AtomicBool,
    loaded: OnceLock<LoadedPlugins>,
    report: OnceLock<LoadReport>,
}

impl PluginLoader {
    pub fn new(
        config: LoaderConfig,
        catalog: ServiceCatalog,
        resources: Arc<ResourceManager>,
    ) -> Result<Self, PluginError> {
        let pool = WorkerPool::new(config.thread_count)?;
        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            resources,
            pool,
            started: AtomicBool::new(false),
            loaded: OnceLock::new(),
            report: OnceLock::new(),
        })
    }

    /// Loads every bundle and blocks until all plugin `init()` calls settle.
    ///
    /// May be called once. Individual bundle and plugin problems are logged
    /// and recorded in the returned report; only failures that make the
    /// whole load set unusable are returned as errors.
    pub fn init(&self, progress: &dyn ProgressObserver) -> Result<LoadReport, PluginError> {
        worker::ensure_blocking_context()?;
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PluginError::AlreadyInitialized);
        }

        let host_id = self.config.host_id.as_str();
        tracing::info!(
            dir = %self.config.plugins_dir.display(),
            host = %host_id,
            "Loading plugins"
        );

        let scan = BundleDiscovery::scan(&self.config.plugins_dir, host_id)?;
        let context = LoadContext::resolve(host_id, scan.accepted, Arc::clone(&self.catalog))?;

        let mut report = LoadReport {
            load_order: context.load_order().into_iter().map(String::from).collect(),
            skipped: scan.skipped,
            ..Default::default()
        };

        let (plugins, order) = Self::wrap_plugins(&context)?;
        report.unregistered_namespaces = self.register_resources(&context, &plugins);

        let loaded = LoadedPlugins {
            context,
            plugins,
            order,
        };
        if self.loaded.set(loaded).is_err() {
            return Err(PluginError::AlreadyInitialized);
        }
        let wrappers = self.plugins();

        progress.set_max_progress(1 + wrappers.len());
        progress.increment_progress();

        self.initialize(&wrappers, progress, &mut report)?;

        report.plugin_count = wrappers.len();
        tracing::info!(
            plugins = report.plugin_count,
            failed = report.failures.len(),
            timed_out = report.timed_out.len(),
            skipped = report.skipped.len(),
            "Plugins loaded"
        );

        let _ = self.report.set(report.clone());
        Ok(report)
    }

    fn wrap_plugins(
        context: &LoadContext,
    ) -> Result<(HashMap<Uuid, Arc<PluginWrapper>>, Vec<Uuid>), PluginError> {
        let mut plugins: HashMap<Uuid, Arc<PluginWrapper>> = HashMap::new();
        let mut order = Vec::new();

        for binding in context.bindings(PluginService::NAME) {
            let Some(plugin) = context.instantiate::<PluginService>(binding) else {
                continue;
            };
            let wrapper = PluginWrapper::new(binding.bundle.clone(), plugin);
            let id = wrapper.id();
            if let Some(existing) = plugins.get(&id) {
                return Err(PluginError::DuplicateIdentity {
                    id,
                    first: existing.bundle().to_string(),
                    second: binding.bundle.clone(),
                });
            }
            tracing::debug!(
                plugin_id = %id,
                bundle = %binding.bundle,
                implementation = %binding.implementation,
                "Discovered plugin"
            );
            plugins.insert(id, Arc::new(wrapper));
            order.push(id);
        }

        Ok((plugins, order))
    }

    /// Registers one archive provider per bundle that contributes plugins.
    /// Returns the namespaces that could not be registered.
    fn register_resources(
        &self,
        context: &LoadContext,
        plugins: &HashMap<Uuid, Arc<PluginWrapper>>,
    ) -> Vec<String> {
        let owners: BTreeSet<&str> = plugins.values().map(|w| w.bundle()).collect();
        let mut unregistered = Vec::new();

        for bundle in context.bundles() {
            if !owners.contains(bundle.id()) {
                continue;
            }
            let provider = ArchiveResourceProvider::new(bundle.id(), Arc::clone(bundle.archive()));
            if let Err(e) = self.resources.register_provider(Arc::new(provider)) {
                tracing::error!(
                    bundle = %bundle.id(),
                    namespace = %bundle.id(),
                    error = %e,
                    "Failed to register bundle resources"
                );
                unregistered.push(bundle.id().to_string());
            }
        }

        unregistered
    }

    fn initialize(
        &self,
        wrappers: &[Arc<PluginWrapper>],
        progress: &dyn ProgressObserver,
        report: &mut LoadReport,
    ) -> Result<(), PluginError> {
        for wrapper in wrappers {
            wrapper.mark_initializing();
        }

        let jobs: Vec<_> = wrappers
            .iter()
            .map(|wrapper| {
                let task = InitTask::new(Arc::clone(wrapper));
                move || task.run()
            })
            .collect();

        let outcomes = self
            .pool
            .run_all(jobs, self.config.init_timeout(), |index, outcome| {
                let wrapper = &wrappers[index];
                match outcome {
                    JobOutcome::Completed(Ok(())) => {
                        tracing::debug!(
                            plugin_id = %wrapper.id(),
                            bundle = %wrapper.bundle(),
                            "Plugin initialized"
                        );
                    }
                    JobOutcome::Completed(Err(message)) | JobOutcome::Panicked(message) => {
                        tracing::error!(
                            plugin_id = %wrapper.id(),
                            bundle = %wrapper.bundle(),
                            error = %message,
                            "Plugin initialization failed"
                        );
                    }
                    JobOutcome::TimedOut => {
                        tracing::error!(
                            plugin_id = %wrapper.id(),
                            bundle = %wrapper.bundle(),
                            "Plugin initialization timed out"
                        );
                    }
                }
                progress.increment_progress();
            })?;

        for (wrapper, outcome) in wrappers.iter().zip(outcomes) {
            match outcome {
                JobOutcome::Completed(Ok(())) => {}
                JobOutcome::Completed(Err(message)) | JobOutcome::Panicked(message) => {
                    report.failures.push(InitFailure {
                        id: wrapper.id(),
                        bundle: wrapper.bundle().to_string(),
                        message,
                    });
                }
                JobOutcome::TimedOut => report.timed_out.push(wrapper.id()),
            }
        }

        Ok(())
    }

    /// The plugin with `id`, once its `init()` has returned.
    ///
    /// Blocks while the plugin is still initializing. Returns `None` if no
    /// such plugin has been discovered.
    pub fn lookup(&self, id: Uuid) -> Option<Arc<dyn Plugin>> {
        let wrapper = self.loaded.get()?.plugins.get(&id)?;
        wrapper.wait_ready();
        Some(Arc::clone(wrapper.plugin()))
    }

    /// The wrapper for `id`, without waiting.
    ///
    /// A plugin listed in [`LoadReport::timed_out`] stays `Initializing` until
    /// its `init()` returns, which may be never.
    pub fn wrapper(&self, id: Uuid) -> Option<Arc<PluginWrapper>> {
        self.loaded.get()?.plugins.get(&id).cloned()
    }

    /// All wrappers in discovery order.
    pub fn plugins(&self) -> Vec<Arc<PluginWrapper>> {
        self.loaded
            .get()
            .map(|l| {
                l.order
                    .iter()
                    .filter_map(|id| l.plugins.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn plugin_ids(&self) -> Vec<Uuid> {
        self.loaded
            .get()
            .map(|l| l.order.clone())
            .unwrap_or_default()
    }

    pub fn plugin_count(&self) -> usize {
        self.loaded.get().map_or(0, |l| l.order.len())
    }

    /// Fresh instances of every implementation of `C` in the load context.
    /// Empty before [`init`](Self::init).
    pub fn services<C: ServiceContract>(&self) -> Services<'_, C> {
        match self.loaded.get() {
            Some(loaded) => loaded.context.services::<C>(),
            None => Services::empty(),
        }
    }

    /// True once `init` has completed.
    pub fn is_initialized(&self) -> bool {
        self.report.get().is_some()
    }

    pub fn context(&self) -> Option<&LoadContext> {
        self.loaded.get().map(|l| &l.context)
    }

    pub fn report(&self) -> Option<&LoadReport> {
        self.report.get()
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugins_dir", &self.config.plugins_dir)
            .field("host_id", &self.config.host_id)
            .field("pool", &self.pool)
            .field("plugins", &self.plugin_count())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
