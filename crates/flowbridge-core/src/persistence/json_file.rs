use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{PersistenceResult, VersionDocument, VersionStore};

/// Stores the registry document as pretty-printed JSON. Saves go to a
/// sibling temp file that is then renamed over the target.
pub struct JsonFileVersionStore {
    path: PathBuf,
}

impl JsonFileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl VersionStore for JsonFileVersionStore {
    fn load(&self) -> PersistenceResult<VersionDocument> {
        if !self.path.exists() {
            return Ok(VersionDocument::new());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|error| storage_error("load", &self.path, error))?;
        if raw.trim().is_empty() {
            return Ok(VersionDocument::new());
        }
        serde_json::from_str(&raw).map_err(|error| storage_error("load", &self.path, error))
    }

    fn save(&self, document: &VersionDocument) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| storage_error("save", parent, error))?;
        }
        let serialized = serde_json::to_string_pretty(document)
            .map_err(|error| storage_error("save", &self.path, error))?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, serialized)
            .map_err(|error| storage_error("save", &temp_path, error))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|error| storage_error("save", &self.path, error))
    }
}

fn storage_error(operation: &str, path: &Path, error: impl std::fmt::Display) -> CoreError {
    let error = CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("json version store {operation} failed for '{}': {error}", path.display()),
    );
    tracing::error!(
        operation,
        path = %path.display(),
        message = %error.message,
        "version store failure"
    );
    error
}
