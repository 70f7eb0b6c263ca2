use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::serde_time::unix_millis;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Raw backend-native job, as read from a source queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub opts: JobOptions,
    #[serde(with = "unix_millis")]
    pub timestamp: SystemTime,
}

impl JobDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data,
            opts: JobOptions::default(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.opts.priority = Some(priority);
        self
    }

    pub fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}
