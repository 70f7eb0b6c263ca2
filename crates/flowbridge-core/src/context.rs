use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::adapters::{AdapterFactory, AdapterHandle};
use crate::config::{AdapterConfig, RuntimeConfig, VersionStoreConfig};
use crate::logging;
use crate::migration::MigrationCoordinator;
use crate::models::{BackendKind, CoreError, CoreErrorKind, CoreResult};
use crate::monitor::StatusMonitor;
use crate::persistence::{InMemoryVersionStore, JsonFileVersionStore, VersionStore};
use crate::sqlite::SqliteStore;
use crate::versioning::VersionRegistry;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-level services, built once and passed to whatever needs them.
pub struct OrchestrationContext {
    config: RuntimeConfig,
    factory: AdapterFactory,
    registry: Arc<VersionRegistry>,
    monitor: Arc<StatusMonitor>,
    adapters: Mutex<HashMap<BackendKind, AdapterHandle>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl OrchestrationContext {
    pub fn init(config: RuntimeConfig) -> CoreResult<Self> {
        Self::init_with_factory(config, AdapterFactory::in_memory())
    }

    pub fn init_with_factory(config: RuntimeConfig, factory: AdapterFactory) -> CoreResult<Self> {
        logging::init_tracing(config.log_filter.as_deref());

        let store = open_version_store(&config.version_store)?;
        let registry = Arc::new(VersionRegistry::load(store)?);

        let context = Self {
            factory,
            registry,
            monitor: Arc::new(StatusMonitor::new()),
            adapters: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
            config,
        };
        for adapter in context.config.adapters.clone() {
            context.connect(&adapter)?;
        }

        tracing::info!(
            adapters = context.config.adapters.len(),
            version_store = ?context.config.version_store,
            "orchestration context initialised"
        );
        Ok(context)
    }

    /// Builds an adapter through the factory and keeps it under its backend kind.
    pub fn connect(&self, config: &AdapterConfig) -> CoreResult<AdapterHandle> {
        if self.is_closed() {
            return Err(closed_error().with_backend(config.kind));
        }
        let mut adapters = self.lock_adapters()?;
        if adapters.contains_key(&config.kind) {
            return Err(CoreError::new(
                CoreErrorKind::Validation,
                format!("an adapter for '{}' is already connected", config.kind),
            )
            .with_backend(config.kind));
        }
        let handle = self.factory.create(config)?;
        adapters.insert(config.kind, handle.clone());
        Ok(handle)
    }

    pub fn adapter(&self, kind: BackendKind) -> CoreResult<AdapterHandle> {
        self.lock_adapters()?.get(&kind).cloned().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::NotFound,
                format!("no adapter connected for '{kind}'"),
            )
            .with_backend(kind)
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<StatusMonitor> {
        &self.monitor
    }

    /// Coordinator from `source` to `target` that shares this context's
    /// registry and monitor.
    pub fn migration_coordinator(
        &self,
        source: BackendKind,
        target: BackendKind,
    ) -> CoreResult<MigrationCoordinator> {
        let jobs = self.adapter(source)?.jobs.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnsupportedCapability,
                format!("adapter for '{source}' does not expose its job queues"),
            )
            .with_backend(source)
        })?;
        let target = self.adapter(target)?.adapter;
        Ok(MigrationCoordinator::new(jobs, target)
            .with_registry(self.registry.clone())
            .with_monitor(self.monitor.clone()))
    }

    /// Starts the periodic monitor cleanup on the current tokio runtime,
    /// replacing any sweeper already running.
    pub fn spawn_retention_sweeper(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("retention sweeper needs a tokio runtime: {error}"),
            )
        })?;

        let monitor = self.monitor.clone();
        let retention = self.config.retention();
        let interval = self
            .config
            .monitor
            .sweep_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        let handle = runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(error) = monitor.cleanup_old_workflows(retention) {
                    tracing::error!(
                        kind = ?error.kind,
                        message = %error.message,
                        "status retention sweep failed"
                    );
                }
            }
        });

        if let Some(previous) = self.lock_sweeper()?.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the sweeper, drops observers and adapters. Idempotent.
    pub fn shutdown(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(sweeper) = self.lock_sweeper()?.take() {
            sweeper.abort();
        }
        self.monitor.clear_observers()?;
        self.lock_adapters()?.clear();
        tracing::info!("orchestration context shut down");
        Ok(())
    }

    fn lock_adapters(&self) -> CoreResult<MutexGuard<'_, HashMap<BackendKind, AdapterHandle>>> {
        self.adapters
            .lock()
            .map_err(|_| CoreError::new(CoreErrorKind::Internal, "adapter table mutex poisoned"))
    }

    fn lock_sweeper(&self) -> CoreResult<MutexGuard<'_, Option<JoinHandle<()>>>> {
        self.sweeper
            .lock()
            .map_err(|_| CoreError::new(CoreErrorKind::Internal, "sweeper mutex poisoned"))
    }
}

impl Drop for OrchestrationContext {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(handle) = sweeper.take()
        {
            handle.abort();
        }
    }
}

fn open_version_store(config: &VersionStoreConfig) -> CoreResult<Arc<dyn VersionStore>> {
    Ok(match config {
        VersionStoreConfig::Memory => Arc::new(InMemoryVersionStore::new()),
        VersionStoreConfig::JsonFile { path } => Arc::new(JsonFileVersionStore::new(path.clone())),
        VersionStoreConfig::Sqlite { path } => {
            let store = SqliteStore::new(path.clone());
            store.migrate_to_latest()?;
            Arc::new(store)
        }
    })
}

fn closed_error() -> CoreError {
    CoreError::new(
        CoreErrorKind::Internal,
        "orchestration context has been shut down",
    )
}
