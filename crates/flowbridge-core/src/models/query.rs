use serde::{Deserialize, Serialize};

use crate::models::JobStatus;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQuery {
    pub name: Option<String>,
    pub version: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl WorkflowQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQuery {
    pub workflow_id: Option<String>,
    pub status: Option<JobStatus>,
    pub idempotency_key: Option<String>,
    pub task_queue: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ExecutionQuery {
    pub fn by_idempotency_key(key: impl Into<String>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn for_workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(workflow_id.into()),
            ..Self::default()
        }
    }

    pub fn workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub name: String,
    pub version: String,
    pub task_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Slices an already filtered, ordered collection.
    pub fn slice(all: Vec<T>, offset: usize, limit: Option<usize>) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Self {
            items,
            total,
            offset,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}
