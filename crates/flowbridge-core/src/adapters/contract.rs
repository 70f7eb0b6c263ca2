use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    AdapterOperation, BackendDescriptor, BackendKind, Capability, CoreError, CoreErrorKind,
    ErrorHandler, ExecutionEvent, ExecutionOptions, ExecutionQuery, HealthReport, JobDescriptor,
    JobStatus, OrchestratorCapabilities, Page, ValidationCode, ValidationResult,
    ValidationWarning, WorkflowDefinition, WorkflowExecutionState, WorkflowQuery,
    WorkflowSummary,
};
use crate::validation::validate_definition;

pub type AdapterResult<T> = Result<T, CoreError>;

pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = AdapterResult<T>> + Send + 'a>>;

/// Health checks report failures in the returned value instead of failing.
pub type HealthFuture<'a> = Pin<Box<dyn Future<Output = HealthReport> + Send + 'a>>;

/// Backend-native rendition of a workflow definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeWorkflow {
    pub backend: BackendKind,
    pub document: Value,
}

/// A conversion result plus everything the target format could not carry.
#[derive(Clone, Debug, PartialEq)]
pub struct Converted<T> {
    pub value: T,
    pub warnings: Vec<ValidationWarning>,
}

/// Contract every backend binding satisfies.
///
/// Async operations return boxed futures so the trait stays object safe and
/// bindings can be held as `Arc<dyn OrchestrationAdapter>`.
pub trait OrchestrationAdapter: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    fn kind(&self) -> BackendKind {
        self.descriptor().kind
    }

    fn capabilities(&self) -> &OrchestratorCapabilities {
        &self.descriptor().capabilities
    }

    /// Structural checks plus the constraints this backend's limits impose.
    fn validate_workflow_definition(&self, definition: &WorkflowDefinition) -> ValidationResult {
        validate_for_backend(self.descriptor(), definition)
    }

    fn convert_to_native_format(
        &self,
        definition: &WorkflowDefinition,
    ) -> AdapterResult<Converted<NativeWorkflow>>;

    fn convert_from_native_format(
        &self,
        native: &NativeWorkflow,
    ) -> AdapterResult<Converted<WorkflowDefinition>>;

    /// Deploying the same `(name, version)` twice yields the same id.
    fn deploy_workflow<'a>(&'a self, definition: WorkflowDefinition) -> AdapterFuture<'a, String>;

    /// Returns the existing execution when `options.idempotency_key` matches a
    /// live or completed run.
    fn execute_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        input: Value,
        options: ExecutionOptions,
    ) -> AdapterFuture<'a, WorkflowExecutionState>;

    fn get_execution_state<'a>(
        &'a self,
        execution_id: &'a str,
    ) -> AdapterFuture<'a, WorkflowExecutionState>;

    /// Requests cancellation. The execution only becomes `CANCELED` once the
    /// backend acknowledges it.
    fn cancel_execution<'a>(
        &'a self,
        execution_id: &'a str,
        reason: Option<String>,
    ) -> AdapterFuture<'a, bool>;

    /// Forcefully ends an execution without giving it a chance to clean up.
    fn terminate_execution<'a>(
        &'a self,
        execution_id: &'a str,
        reason: Option<String>,
    ) -> AdapterFuture<'a, bool>;

    fn get_execution_history<'a>(
        &'a self,
        execution_id: &'a str,
    ) -> AdapterFuture<'a, Vec<ExecutionEvent>>;

    fn schedule_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        cron_expression: &'a str,
        input: Option<Value>,
    ) -> AdapterFuture<'a, String>;

    /// Resolves to `false` without side effects when the backend cannot signal.
    fn signal_workflow<'a>(
        &'a self,
        execution_id: &'a str,
        signal_name: &'a str,
        payload: Option<Value>,
    ) -> AdapterFuture<'a, bool>;

    fn list_workflows<'a>(&'a self, query: WorkflowQuery)
    -> AdapterFuture<'a, Page<WorkflowSummary>>;

    fn list_executions<'a>(
        &'a self,
        query: ExecutionQuery,
    ) -> AdapterFuture<'a, Page<WorkflowExecutionState>>;

    fn register_error_handler(&self, handler: ErrorHandler);

    fn check_health<'a>(&'a self) -> HealthFuture<'a>;
}

/// Raw job access for backends whose native unit is a queued job rather than
/// a workflow execution. Read by the migration coordinator.
pub trait JobSource: Send + Sync {
    fn list_jobs<'a>(&'a self, queue: &'a str) -> AdapterFuture<'a, Vec<JobDescriptor>>;

    fn job_status<'a>(&'a self, queue: &'a str, job_id: &'a str) -> AdapterFuture<'a, JobStatus>;

    fn remove_job<'a>(&'a self, queue: &'a str, job_id: &'a str) -> AdapterFuture<'a, bool>;
}

pub fn validate_for_backend(
    descriptor: &BackendDescriptor,
    definition: &WorkflowDefinition,
) -> ValidationResult {
    let mut result = validate_definition(definition);
    let limits = descriptor.capabilities.limits;

    if definition.tasks.is_empty() {
        result.error(
            ValidationCode::NoTasks,
            "workflow must contain at least one task",
            Some("tasks".to_string()),
        );
    }

    if let Some(max_tasks) = limits.max_tasks
        && definition.tasks.len() > max_tasks
    {
        result.error(
            ValidationCode::TooManyTasks,
            format!(
                "{} supports at most {max_tasks} tasks, definition has {}",
                descriptor.display_name,
                definition.tasks.len()
            ),
            Some("tasks".to_string()),
        );
    }

    if definition.name.contains('@') || definition.name.trim().is_empty() {
        result.error(
            ValidationCode::IdentifierFormat,
            format!(
                "workflow name '{}' must be non-empty and must not contain '@'",
                definition.name
            ),
            Some("name".to_string()),
        );
    }

    for task in &definition.tasks {
        if !limits.transform_hooks && task.has_transform_hooks() {
            result.error(
                ValidationCode::UnsupportedHook,
                format!(
                    "task '{}' uses transform hooks, which {} does not support",
                    task.id, descriptor.display_name
                ),
                Some(format!("tasks[{}]", task.id)),
            );
        }
        if !limits.error_hooks && task.on_error.is_some() {
            result.error(
                ValidationCode::UnsupportedHook,
                format!(
                    "task '{}' declares an onError hook, which {} does not support",
                    task.id, descriptor.display_name
                ),
                Some(format!("tasks[{}].onError", task.id)),
            );
        }
    }

    result
}

pub fn ensure_capability_supported(
    descriptor: &BackendDescriptor,
    capability: Capability,
    operation: AdapterOperation,
) -> AdapterResult<()> {
    if descriptor.supports(capability) {
        return Ok(());
    }
    Err(CoreError::new(
        CoreErrorKind::UnsupportedCapability,
        format!(
            "{} does not support {capability:?}",
            descriptor.display_name
        ),
    )
    .with_backend(descriptor.kind)
    .with_operation(operation))
}
