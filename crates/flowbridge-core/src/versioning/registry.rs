use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use semver::Version;
use serde_json::Value;

use crate::models::serde_time::unix_millis;
use crate::models::{CoreError, CoreErrorKind, CoreResult, VersionSelector, WorkflowVersion};
use crate::persistence::{InMemoryVersionStore, VersionDocument, VersionStore};

#[derive(Clone, Debug, PartialEq)]
pub struct VersionRegistration {
    pub workflow_name: String,
    pub version: String,
    pub task_queue: String,
    pub build_id: String,
    pub compatible_with: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl VersionRegistration {
    pub fn new(
        workflow_name: impl Into<String>,
        version: impl Into<String>,
        task_queue: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            version: version.into(),
            task_queue: task_queue.into(),
            build_id: build_id.into(),
            compatible_with: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn compatible_with(mut self, versions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.compatible_with
            .extend(versions.into_iter().map(Into::into));
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Append-only catalogue of workflow versions.
///
/// Each name's versions are kept sorted by descending semver precedence.
/// Mutations are written to the store before they become visible, so a
/// failed save leaves the registry as it was.
pub struct VersionRegistry {
    store: Arc<dyn VersionStore>,
    versions: Mutex<VersionDocument>,
}

impl VersionRegistry {
    pub fn load(store: Arc<dyn VersionStore>) -> CoreResult<Self> {
        let mut document = store.load()?;
        for (name, versions) in document.iter_mut() {
            versions.retain(|entry| {
                let valid = Version::parse(&entry.version).is_ok();
                if !valid {
                    tracing::warn!(
                        workflow = %name,
                        version = %entry.version,
                        "dropping persisted version with invalid semver"
                    );
                }
                valid
            });
            sort_descending(versions);
        }
        document.retain(|_, versions| !versions.is_empty());

        Ok(Self {
            store,
            versions: Mutex::new(document),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryVersionStore::new()),
            versions: Mutex::new(VersionDocument::new()),
        }
    }

    pub fn register_version(&self, registration: VersionRegistration) -> CoreResult<WorkflowVersion> {
        if Version::parse(&registration.version).is_err() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidVersion,
                format!(
                    "'{}' is not a valid semantic version",
                    registration.version
                ),
            )
            .with_workflow(registration.workflow_name));
        }

        let mut versions = self.lock_versions()?;
        let existing = versions
            .get(&registration.workflow_name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if existing
            .iter()
            .any(|entry| entry.version == registration.version)
        {
            return Err(CoreError::new(
                CoreErrorKind::DuplicateVersion,
                format!(
                    "version {} of workflow '{}' is already registered",
                    registration.version, registration.workflow_name
                ),
            )
            .with_workflow(registration.workflow_name));
        }

        let created = WorkflowVersion {
            workflow_name: registration.workflow_name.clone(),
            version: registration.version,
            build_id: registration.build_id,
            task_queue: registration.task_queue,
            compatible: registration.compatible_with,
            created_at: unix_millis::from_millis(unix_millis::to_millis(SystemTime::now())),
            metadata: registration.metadata,
        };

        let mut staged = versions.clone();
        let list = staged.entry(created.workflow_name.clone()).or_default();
        list.push(created.clone());
        sort_descending(list);
        self.commit(&mut versions, staged)?;

        tracing::info!(
            workflow = %created.workflow_name,
            version = %created.version,
            task_queue = %created.task_queue,
            "registered workflow version"
        );
        Ok(created)
    }

    pub fn get_latest_version(&self, workflow_name: &str) -> CoreResult<Option<WorkflowVersion>> {
        Ok(self
            .lock_versions()?
            .get(workflow_name)
            .and_then(|versions| versions.first())
            .cloned())
    }

    pub fn get_version(
        &self,
        workflow_name: &str,
        version: &str,
    ) -> CoreResult<Option<WorkflowVersion>> {
        Ok(self
            .lock_versions()?
            .get(workflow_name)
            .and_then(|versions| versions.iter().find(|entry| entry.version == version))
            .cloned())
    }

    /// Symmetric: either side listing the other is enough. Falls back to a
    /// shared semver major. Unknown versions are never compatible.
    pub fn are_versions_compatible(
        &self,
        workflow_name: &str,
        first: &str,
        second: &str,
    ) -> CoreResult<bool> {
        let versions = self.lock_versions()?;
        let Some(registered) = versions.get(workflow_name) else {
            return Ok(false);
        };
        let find = |version: &str| registered.iter().find(|entry| entry.version == version);
        let (Some(a), Some(b)) = (find(first), find(second)) else {
            return Ok(false);
        };

        if a.version == b.version || a.lists_as_compatible(&b.version) || b.lists_as_compatible(&a.version)
        {
            return Ok(true);
        }
        match (Version::parse(&a.version), Version::parse(&b.version)) {
            (Ok(a), Ok(b)) => Ok(a.major == b.major),
            _ => Ok(false),
        }
    }

    pub fn get_task_queue_for_version(
        &self,
        workflow_name: &str,
        selector: impl Into<VersionSelector>,
    ) -> CoreResult<Option<String>> {
        Ok(self
            .resolve(workflow_name, &selector.into())?
            .map(|version| version.task_queue))
    }

    pub fn resolve(
        &self,
        workflow_name: &str,
        selector: &VersionSelector,
    ) -> CoreResult<Option<WorkflowVersion>> {
        match selector {
            VersionSelector::Latest => self.get_latest_version(workflow_name),
            VersionSelector::Exact(version) => self.get_version(workflow_name, version),
        }
    }

    /// Permanent. Executions already using the version's queue are untouched.
    pub fn remove_version(&self, workflow_name: &str, version: &str) -> CoreResult<bool> {
        let mut versions = self.lock_versions()?;
        let Some(existing) = versions.get(workflow_name) else {
            return Ok(false);
        };
        if !existing.iter().any(|entry| entry.version == version) {
            return Ok(false);
        }

        let mut staged = versions.clone();
        if let Some(list) = staged.get_mut(workflow_name) {
            list.retain(|entry| entry.version != version);
            if list.is_empty() {
                staged.remove(workflow_name);
            }
        }
        self.commit(&mut versions, staged)?;

        tracing::info!(workflow = %workflow_name, version, "removed workflow version");
        Ok(true)
    }

    pub fn get_all_versions(&self, workflow_name: &str) -> CoreResult<Vec<WorkflowVersion>> {
        Ok(self
            .lock_versions()?
            .get(workflow_name)
            .cloned()
            .unwrap_or_default())
    }

    pub fn workflow_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.lock_versions()?.keys().cloned().collect())
    }

    fn commit(
        &self,
        current: &mut MutexGuard<'_, VersionDocument>,
        staged: VersionDocument,
    ) -> CoreResult<()> {
        if let Err(error) = self.store.save(&staged) {
            tracing::error!(
                kind = ?error.kind,
                message = %error.message,
                "failed to persist version registry; mutation discarded"
            );
            return Err(error);
        }
        **current = staged;
        Ok(())
    }

    fn lock_versions(&self) -> CoreResult<MutexGuard<'_, VersionDocument>> {
        self.versions.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "version registry mutex poisoned")
        })
    }
}

fn sort_descending(versions: &mut [WorkflowVersion]) {
    versions.sort_by(|a, b| match (Version::parse(&a.version), Version::parse(&b.version)) {
        (Ok(a), Ok(b)) => b.cmp(&a),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    });
}
