use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::serde_time::unix_millis;

/// One registered version of a named workflow. Never mutated after
/// registration; only added or removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVersion {
    pub workflow_name: String,
    pub version: String,
    pub build_id: String,
    pub task_queue: String,
    #[serde(default)]
    pub compatible: Vec<String>,
    #[serde(with = "unix_millis")]
    pub created_at: SystemTime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl WorkflowVersion {
    pub fn lists_as_compatible(&self, version: &str) -> bool {
        self.compatible.iter().any(|entry| entry == version)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum VersionSelector {
    Latest,
    Exact(String),
}

impl From<&str> for VersionSelector {
    fn from(value: &str) -> Self {
        if value == "latest" {
            Self::Latest
        } else {
            Self::Exact(value.to_string())
        }
    }
}

impl From<String> for VersionSelector {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(version) => f.write_str(version),
        }
    }
}
