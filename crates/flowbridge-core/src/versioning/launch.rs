use serde_json::{Value, json};

use crate::adapters::OrchestrationAdapter;
use crate::models::{
    AdapterOperation, CoreError, CoreErrorKind, CoreResult, ExecutionOptions, VersionSelector,
    WorkflowExecutionState, WorkflowQuery,
};
use crate::versioning::VersionRegistry;

/// Starts the deployed workflow matching a registered version.
///
/// The version's task queue is used unless `options` already names one, and
/// its build id travels in the execution metadata under `buildId`.
pub async fn start_versioned_workflow(
    adapter: &dyn OrchestrationAdapter,
    registry: &VersionRegistry,
    workflow_name: &str,
    selector: impl Into<VersionSelector>,
    input: Value,
    options: ExecutionOptions,
) -> CoreResult<WorkflowExecutionState> {
    let selector = selector.into();
    let version = registry.resolve(workflow_name, &selector)?.ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::NotFound,
            format!("no version '{selector}' registered for workflow '{workflow_name}'"),
        )
        .with_workflow(workflow_name)
    })?;

    let deployed = adapter
        .list_workflows(WorkflowQuery::named(workflow_name).version(version.version.clone()))
        .await?;
    let workflow_id = deployed
        .items
        .first()
        .map(|summary| summary.workflow_id.clone())
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::NotFound,
                format!(
                    "version {} of workflow '{workflow_name}' is not deployed",
                    version.version
                ),
            )
            .with_backend(adapter.kind())
            .with_workflow(workflow_name)
            .with_operation(AdapterOperation::Execute)
        })?;

    let mut options = options.metadata("buildId", json!(version.build_id));
    if options.task_queue.is_none() {
        options.task_queue = Some(version.task_queue.clone());
    }

    tracing::info!(
        backend = ?adapter.kind(),
        workflow = %workflow_name,
        version = %version.version,
        task_queue = options.task_queue.as_deref().unwrap_or_default(),
        "starting versioned workflow"
    );
    adapter.execute_workflow(&workflow_id, input, options).await
}
