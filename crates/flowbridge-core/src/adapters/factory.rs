use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{AdapterResult, InMemoryAdapter, JobSource, OrchestrationAdapter};
use crate::config::AdapterConfig;
use crate::models::{BackendKind, CoreError, CoreErrorKind};

/// A connected backend binding. `jobs` is present when the backend also
/// exposes its raw job queues.
#[derive(Clone)]
pub struct AdapterHandle {
    pub adapter: Arc<dyn OrchestrationAdapter>,
    pub jobs: Option<Arc<dyn JobSource>>,
}

impl AdapterHandle {
    pub fn kind(&self) -> BackendKind {
        self.adapter.kind()
    }
}

pub type AdapterConstructor =
    Arc<dyn Fn(&AdapterConfig) -> AdapterResult<AdapterHandle> + Send + Sync>;

/// Static table from backend tag to binding constructor. Holds no workflow
/// state of its own.
#[derive(Clone, Default)]
pub struct AdapterFactory {
    constructors: HashMap<BackendKind, AdapterConstructor>,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory wired to the in-process backend for every backend family.
    pub fn in_memory() -> Self {
        let mut factory = Self::new();
        for kind in BackendKind::ALL {
            factory.constructors.insert(
                kind,
                Arc::new(|config: &AdapterConfig| -> AdapterResult<AdapterHandle> {
                    let adapter = Arc::new(InMemoryAdapter::from_config(config)?);
                    Ok(AdapterHandle {
                        adapter: adapter.clone(),
                        jobs: Some(adapter),
                    })
                }),
            );
        }
        factory
    }

    pub fn register(
        &mut self,
        kind: BackendKind,
        constructor: AdapterConstructor,
    ) -> AdapterResult<()> {
        if self.constructors.contains_key(&kind) {
            return Err(CoreError::new(
                CoreErrorKind::Validation,
                format!("duplicate adapter registration for backend '{kind}'"),
            )
            .with_backend(kind));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn registered_kinds(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.constructors.contains_key(kind))
            .collect()
    }

    pub fn create(&self, config: &AdapterConfig) -> AdapterResult<AdapterHandle> {
        let constructor = self.constructors.get(&config.kind).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnsupportedCapability,
                format!("no adapter registered for backend '{}'", config.kind),
            )
            .with_backend(config.kind)
        })?;

        let handle = constructor(config).map_err(|error| {
            tracing::error!(
                backend = ?config.kind,
                url = config.connection.url.as_deref().unwrap_or("<none>"),
                kind = ?error.kind,
                message = %error.message,
                "failed to construct adapter"
            );
            error
        })?;
        tracing::info!(backend = ?config.kind, "adapter connected");
        Ok(handle)
    }
}
