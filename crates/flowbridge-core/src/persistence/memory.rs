use std::sync::Mutex;

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{PersistenceResult, VersionDocument, VersionStore};

#[derive(Default)]
pub struct InMemoryVersionStore {
    document: Mutex<VersionDocument>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: VersionDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }
}

impl VersionStore for InMemoryVersionStore {
    fn load(&self) -> PersistenceResult<VersionDocument> {
        Ok(self.document.lock().map_err(|_| poisoned())?.clone())
    }

    fn save(&self, document: &VersionDocument) -> PersistenceResult<()> {
        *self.document.lock().map_err(|_| poisoned())? = document.clone();
        Ok(())
    }
}

fn poisoned() -> CoreError {
    CoreError::new(CoreErrorKind::Internal, "version store mutex poisoned")
}
