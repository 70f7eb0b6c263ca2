use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::serde_time::{option_duration_millis, option_unix_millis, unix_millis};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Canceled,
    Timeout,
    Terminated,
    Unknown,
}

impl JobStatus {
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Waiting,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Canceled,
        JobStatus::Timeout,
        JobStatus::Terminated,
        JobStatus::Unknown,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Canceled | Self::Timeout | Self::Terminated
        )
    }

    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionState {
    pub status: JobStatus,
    #[serde(default, with = "option_unix_millis")]
    pub start_time: Option<SystemTime>,
    #[serde(default, with = "option_unix_millis")]
    pub end_time: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<Value>,
}

impl TaskExecutionState {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            start_time: None,
            end_time: None,
            output: None,
            error: None,
            retry_count: 0,
            compensation: None,
        }
    }
}

/// Run-time state of one workflow execution, owned by the adapter driving it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionState {
    pub execution_id: String,
    pub workflow_id: String,
    #[serde(default)]
    pub input: Value,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskExecutionState>,
    #[serde(with = "unix_millis")]
    pub start_time: SystemTime,
    #[serde(default, with = "option_unix_millis")]
    pub end_time: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue: Option<String>,
}

impl WorkflowExecutionState {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completed tasks as a percentage of all tasks, rounded down.
    pub fn computed_progress(&self) -> u8 {
        if self.tasks.is_empty() {
            return if self.status == JobStatus::Completed { 100 } else { 0 };
        }
        let done = self
            .tasks
            .values()
            .filter(|task| task.status == JobStatus::Completed)
            .count();
        ((done * 100) / self.tasks.len()) as u8
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    /// Return immediately instead of waiting for the backend to accept the run.
    #[serde(default)]
    pub detached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue: Option<String>,
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEventKind {
    ExecutionStarted,
    TaskStarted { task_id: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String, error: String },
    TaskRetryScheduled { task_id: String, attempt: u32, delay_ms: u64 },
    TaskCompensated { task_id: String },
    TaskErrorIgnored { task_id: String, error: String },
    SignalReceived { signal: String },
    CancellationRequested { reason: Option<String> },
    StatusChanged { from: JobStatus, to: JobStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub sequence: u64,
    #[serde(with = "unix_millis")]
    pub timestamp: SystemTime,
    pub kind: ExecutionEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}
