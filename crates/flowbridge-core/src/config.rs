use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BackendKind, CoreError, CoreErrorKind, CoreResult};
use crate::monitor::{Backoff, RetryPolicy};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutConfig>,
}

/// How to reach one backend. Read-only once an adapter has been built from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl AdapterConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            connection: ConnectionConfig::default(),
            options: BTreeMap::new(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.connection.url = Some(url.into());
        self
    }

    pub fn timeouts(mut self, connection_ms: Option<u64>, operation_ms: Option<u64>) -> Self {
        self.connection.timeouts = Some(TimeoutConfig {
            connection_ms,
            operation_ms,
        });
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection
            .timeouts
            .as_ref()
            .and_then(|timeouts| timeouts.connection_ms)
            .map(Duration::from_millis)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.connection
            .timeouts
            .as_ref()
            .and_then(|timeouts| timeouts.operation_ms)
            .map(Duration::from_millis)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionStoreConfig {
    #[default]
    Memory,
    JsonFile {
        path: PathBuf,
    },
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_ms: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention_ms(),
            sweep_interval_ms: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    Fixed,
    Exponential {
        factor: f64,
        max_delay_ms: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        let backoff = match self.backoff {
            BackoffConfig::Fixed => Backoff::Fixed(delay),
            BackoffConfig::Exponential {
                factor,
                max_delay_ms,
            } => Backoff::Exponential {
                initial: delay,
                factor,
                max: Duration::from_millis(max_delay_ms),
            },
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub version_store: VersionStoreConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
}

impl RuntimeConfig {
    pub fn from_json_str(raw: &str) -> CoreResult<Self> {
        serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Validation,
                format!("invalid runtime configuration: {error}"),
            )
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!(
                    "failed to read runtime configuration '{}': {error}",
                    path.display()
                ),
            )
        })?;
        Self::from_json_str(&raw)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.monitor.retention_ms)
    }
}

fn default_retention_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_takes_defaults() {
        let config = RuntimeConfig::from_json_str("{}").expect("empty config should parse");

        assert_eq!(config.version_store, VersionStoreConfig::Memory);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 100);
        assert_eq!(config.retention(), Duration::from_secs(86_400));
        assert!(config.adapters.is_empty());
    }

    #[test]
    fn adapters_and_stores_use_snake_case_tags() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "versionStore": { "kind": "sqlite", "path": "/tmp/versions.db" },
                "retry": { "maxAttempts": 5, "delayMs": 20,
                           "backoff": { "kind": "exponential", "factor": 2.0, "max_delay_ms": 500 } },
                "adapters": [
                    { "type": "job_queue",
                      "connection": { "url": "redis://localhost", "timeouts": { "operationMs": 250 } },
                      "options": { "defaultTaskQueue": "legacy" } }
                ]
            }"#,
        )
        .expect("config should parse");

        assert_eq!(
            config.version_store,
            VersionStoreConfig::Sqlite {
                path: PathBuf::from("/tmp/versions.db")
            }
        );
        let adapter = &config.adapters[0];
        assert_eq!(adapter.kind, BackendKind::JobQueue);
        assert_eq!(adapter.operation_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(adapter.connection_timeout(), None);
        assert_eq!(adapter.option_str("defaultTaskQueue"), Some("legacy"));

        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(80));
    }

    #[test]
    fn unknown_backend_tag_is_a_validation_error() {
        let error = RuntimeConfig::from_json_str(r#"{ "adapters": [ { "type": "ftp" } ] }"#)
            .expect_err("unknown backend should fail");
        assert_eq!(error.kind, CoreErrorKind::Validation);
    }
}
