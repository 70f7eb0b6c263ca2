pub mod json_file;
pub mod memory;

pub use json_file::JsonFileVersionStore;
pub use memory::InMemoryVersionStore;

use std::collections::BTreeMap;

use crate::models::{CoreError, WorkflowVersion};

pub type PersistenceResult<T> = Result<T, CoreError>;

/// Persisted registry document: workflow name to its registered versions.
pub type VersionDocument = BTreeMap<String, Vec<WorkflowVersion>>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Backing store for the version registry. `save` replaces the whole
/// document and must be fully visible to the next `load`.
pub trait VersionStore: Send + Sync {
    fn load(&self) -> PersistenceResult<VersionDocument>;

    fn save(&self, document: &VersionDocument) -> PersistenceResult<()>;
}
