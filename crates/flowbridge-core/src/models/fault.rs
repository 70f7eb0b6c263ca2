use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::models::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FaultScope {
    Task,
    Workflow,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorContext {
    pub scope: FaultScope,
    pub entity_id: Option<String>,
    pub attempt_number: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorAction {
    Retry,
    Fail,
    Ignore,
    Compensate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorDecision {
    pub action: ErrorAction,
    pub retry_delay: Option<Duration>,
    pub compensation_data: Option<Value>,
}

impl ErrorDecision {
    pub fn retry(delay: Duration) -> Self {
        Self {
            action: ErrorAction::Retry,
            retry_delay: Some(delay),
            compensation_data: None,
        }
    }

    pub fn fail() -> Self {
        Self {
            action: ErrorAction::Fail,
            retry_delay: None,
            compensation_data: None,
        }
    }

    pub fn ignore() -> Self {
        Self {
            action: ErrorAction::Ignore,
            retry_delay: None,
            compensation_data: None,
        }
    }

    pub fn compensate(data: Value) -> Self {
        Self {
            action: ErrorAction::Compensate,
            retry_delay: None,
            compensation_data: Some(data),
        }
    }
}

/// Consulted whenever a backend reports a task or workflow fault.
pub type ErrorHandler = Arc<dyn Fn(&CoreError, &ErrorContext) -> ErrorDecision + Send + Sync>;
