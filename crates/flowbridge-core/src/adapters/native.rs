//! Conversion between `WorkflowDefinition` and each backend family's native
//! document shape.
//!
//! Durable workflow documents carry every field. Job queue flows have no slot
//! for transform hooks and visual automation graphs have none for priorities
//! or error hooks; those fields are dropped with an `UnrepresentableField`
//! warning so callers can see exactly what was lost. Reading a document back
//! clamps integers that do not fit a task field and warns the same way.

use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::adapters::{AdapterResult, Converted, NativeWorkflow};
use crate::models::{
    AdapterOperation, BackendKind, CoreError, CoreErrorKind, ValidationCode, ValidationWarning,
    WorkflowDefinition, WorkflowTask,
};

pub fn to_native(backend: BackendKind, definition: &WorkflowDefinition) -> Converted<NativeWorkflow> {
    let mut warnings = Vec::new();
    let document = match backend {
        BackendKind::DurableWorkflow => durable_document(definition),
        BackendKind::JobQueue => job_queue_document(definition, &mut warnings),
        BackendKind::VisualAutomation => visual_document(definition, &mut warnings),
    };
    Converted {
        value: NativeWorkflow { backend, document },
        warnings,
    }
}

pub fn from_native(native: &NativeWorkflow) -> AdapterResult<Converted<WorkflowDefinition>> {
    let document = native
        .document
        .as_object()
        .ok_or_else(|| malformed(native.backend, "native document must be a JSON object"))?;
    let mut warnings = Vec::new();
    let definition = match native.backend {
        BackendKind::DurableWorkflow => durable_definition(document, &mut warnings),
        BackendKind::JobQueue => job_queue_definition(document, &mut warnings),
        BackendKind::VisualAutomation => visual_definition(document, &mut warnings),
    }
    .map_err(|message| malformed(native.backend, message))?;
    Ok(Converted {
        value: definition,
        warnings,
    })
}

fn durable_document(definition: &WorkflowDefinition) -> Value {
    let activities: Vec<Value> = definition
        .tasks
        .iter()
        .map(|task| {
            let mut activity = json!({
                "activityId": task.id,
                "displayName": task.name,
                "activityType": task.task_type,
                "arguments": task.input,
                "waitFor": task.dependencies,
                "priority": task.priority,
                "retryPolicy": { "maximumAttempts": task.retries.saturating_add(1) },
            });
            insert_timeout(&mut activity, "startToCloseTimeoutMs", task.timeout);
            insert_opt(&mut activity, "inputTransform", task.input_function.as_deref());
            insert_opt(&mut activity, "outputTransform", task.output_function.as_deref());
            insert_opt(&mut activity, "errorHandler", task.on_error.as_deref());
            activity
        })
        .collect();

    let mut document = json!({
        "workflowId": definition.id,
        "workflowType": definition.name,
        "version": definition.version,
        "activities": activities,
    });
    insert_opt(&mut document, "resultActivity", definition.output_task.as_deref());
    insert_opt(&mut document, "description", definition.description.as_deref());
    document
}

fn durable_definition(
    document: &Map<String, Value>,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<WorkflowDefinition, String> {
    let mut definition = WorkflowDefinition::new(
        required_str(document, "workflowId")?,
        required_str(document, "workflowType")?,
        required_str(document, "version")?,
    );
    definition.output_task = optional_str(document, "resultActivity");
    definition.description = optional_str(document, "description");

    for activity in required_array(document, "activities")? {
        let activity = activity
            .as_object()
            .ok_or_else(|| "activities must be objects".to_string())?;
        let mut task = WorkflowTask::new(
            required_str(activity, "activityId")?,
            required_str(activity, "activityType")?,
        );
        if let Some(name) = optional_str(activity, "displayName") {
            task.name = name;
        }
        task.input = activity.get("arguments").cloned().unwrap_or(Value::Null);
        task.dependencies = string_set(activity, "waitFor");
        task.priority = integer(activity.get("priority"), &task, "priority", warnings)
            .map_or(0, |value| narrow_i32(value, &task, "priority", warnings));
        task.timeout = optional_u64(activity, "startToCloseTimeoutMs").map(Duration::from_millis);
        let attempts = activity
            .get("retryPolicy")
            .and_then(|policy| policy.get("maximumAttempts"));
        task.retries = retries_from_attempts(attempts, &task, warnings);
        task.input_function = optional_str(activity, "inputTransform");
        task.output_function = optional_str(activity, "outputTransform");
        task.on_error = optional_str(activity, "errorHandler");
        definition.tasks.push(task);
    }
    Ok(definition)
}

fn job_queue_document(
    definition: &WorkflowDefinition,
    warnings: &mut Vec<ValidationWarning>,
) -> Value {
    let jobs: Vec<Value> = definition
        .tasks
        .iter()
        .map(|task| {
            if task.input_function.is_some() {
                dropped(warnings, task, "inputFunction", "job queue flows");
            }
            if task.output_function.is_some() {
                dropped(warnings, task, "outputFunction", "job queue flows");
            }
            let mut opts = json!({
                "priority": task.priority,
                "attempts": task.retries.saturating_add(1),
            });
            insert_timeout(&mut opts, "timeout", task.timeout);
            let mut job = json!({
                "name": task.id,
                "label": task.name,
                "handler": task.task_type,
                "data": task.input,
                "parents": task.dependencies,
                "opts": opts,
            });
            insert_opt(&mut job, "onFailed", task.on_error.as_deref());
            job
        })
        .collect();

    let mut document = json!({
        "flowId": definition.id,
        "queueName": definition.name,
        "version": definition.version,
        "jobs": jobs,
    });
    insert_opt(&mut document, "resultJob", definition.output_task.as_deref());
    insert_opt(&mut document, "description", definition.description.as_deref());
    document
}

fn job_queue_definition(
    document: &Map<String, Value>,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<WorkflowDefinition, String> {
    let mut definition = WorkflowDefinition::new(
        required_str(document, "flowId")?,
        required_str(document, "queueName")?,
        required_str(document, "version")?,
    );
    definition.output_task = optional_str(document, "resultJob");
    definition.description = optional_str(document, "description");

    for job in required_array(document, "jobs")? {
        let job = job
            .as_object()
            .ok_or_else(|| "jobs must be objects".to_string())?;
        let mut task = WorkflowTask::new(required_str(job, "name")?, required_str(job, "handler")?);
        if let Some(label) = optional_str(job, "label") {
            task.name = label;
        }
        task.input = job.get("data").cloned().unwrap_or(Value::Null);
        task.dependencies = string_set(job, "parents");
        if let Some(opts) = job.get("opts").and_then(Value::as_object) {
            task.priority = integer(opts.get("priority"), &task, "priority", warnings)
                .map_or(0, |value| narrow_i32(value, &task, "priority", warnings));
            task.retries = retries_from_attempts(opts.get("attempts"), &task, warnings);
            task.timeout = optional_u64(opts, "timeout").map(Duration::from_millis);
        }
        task.on_error = optional_str(job, "onFailed");
        definition.tasks.push(task);
    }
    Ok(definition)
}

fn visual_document(definition: &WorkflowDefinition, warnings: &mut Vec<ValidationWarning>) -> Value {
    let mut connections = Map::new();
    let nodes: Vec<Value> = definition
        .tasks
        .iter()
        .map(|task| {
            if task.priority != 0 {
                dropped(warnings, task, "priority", "visual automation graphs");
            }
            if task.on_error.is_some() {
                dropped(warnings, task, "onError", "visual automation graphs");
            }
            for dependency in &task.dependencies {
                let targets = connections
                    .entry(dependency.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(targets) = targets {
                    targets.push(Value::String(task.id.clone()));
                }
            }
            let mut node = json!({
                "id": task.id,
                "name": task.name,
                "type": task.task_type,
                "parameters": task.input,
                "retryOnFail": task.retries > 0,
                "maxTries": task.retries,
            });
            insert_timeout(&mut node, "timeoutMs", task.timeout);
            insert_opt(&mut node, "inputExpression", task.input_function.as_deref());
            insert_opt(&mut node, "outputExpression", task.output_function.as_deref());
            node
        })
        .collect();

    let mut meta = json!({});
    insert_opt(&mut meta, "outputNode", definition.output_task.as_deref());
    insert_opt(&mut meta, "description", definition.description.as_deref());

    json!({
        "id": definition.id,
        "name": definition.name,
        "versionId": definition.version,
        "nodes": nodes,
        "connections": connections,
        "meta": meta,
    })
}

fn visual_definition(
    document: &Map<String, Value>,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<WorkflowDefinition, String> {
    let mut definition = WorkflowDefinition::new(
        required_str(document, "id")?,
        required_str(document, "name")?,
        required_str(document, "versionId")?,
    );
    if let Some(meta) = document.get("meta").and_then(Value::as_object) {
        definition.output_task = optional_str(meta, "outputNode");
        definition.description = optional_str(meta, "description");
    }

    for node in required_array(document, "nodes")? {
        let node = node
            .as_object()
            .ok_or_else(|| "nodes must be objects".to_string())?;
        let mut task = WorkflowTask::new(required_str(node, "id")?, required_str(node, "type")?);
        if let Some(name) = optional_str(node, "name") {
            task.name = name;
        }
        task.input = node.get("parameters").cloned().unwrap_or(Value::Null);
        task.retries = integer(node.get("maxTries"), &task, "retries", warnings)
            .map_or(0, |value| narrow_u32(value, &task, "retries", warnings));
        task.timeout = optional_u64(node, "timeoutMs").map(Duration::from_millis);
        task.input_function = optional_str(node, "inputExpression");
        task.output_function = optional_str(node, "outputExpression");
        definition.tasks.push(task);
    }

    if let Some(connections) = document.get("connections").and_then(Value::as_object) {
        for (source, targets) in connections {
            for target in targets.as_array().into_iter().flatten() {
                let Some(target) = target.as_str() else {
                    continue;
                };
                let task = definition
                    .find_task_mut(target)
                    .ok_or_else(|| format!("connection targets unknown node '{target}'"))?;
                task.dependencies.insert(source.clone());
            }
        }
    }
    Ok(definition)
}

fn dropped(warnings: &mut Vec<ValidationWarning>, task: &WorkflowTask, field: &str, format: &str) {
    warnings.push(ValidationWarning {
        code: ValidationCode::UnrepresentableField,
        message: format!(
            "task '{}' field '{field}' cannot be represented in {format} and was dropped",
            task.id
        ),
        path: Some(format!("tasks[{}].{field}", task.id)),
    });
}

fn insert_opt(target: &mut Value, key: &str, value: Option<&str>) {
    if let (Value::Object(map), Some(value)) = (target, value) {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn insert_timeout(target: &mut Value, key: &str, timeout: Option<Duration>) {
    if let (Value::Object(map), Some(timeout)) = (target, timeout) {
        map.insert(key.to_string(), json!(timeout.as_millis() as u64));
    }
}

fn required_str(map: &Map<String, Value>, key: &str) -> Result<String, String> {
    optional_str(map, key).ok_or_else(|| format!("missing string field '{key}'"))
}

fn optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn optional_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key).and_then(Value::as_u64)
}

/// Reads an integer of any JSON width. Present non-integer values are
/// dropped with a warning.
fn integer(
    raw: Option<&Value>,
    task: &WorkflowTask,
    field: &str,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<i128> {
    let raw = raw.filter(|value| !value.is_null())?;
    let value = raw
        .as_i64()
        .map(i128::from)
        .or_else(|| raw.as_u64().map(i128::from));
    if value.is_none() {
        warnings.push(unrepresentable(
            task,
            field,
            format!("value {raw} is not an integer and was dropped"),
        ));
    }
    value
}

fn narrow_i32(value: i128, task: &WorkflowTask, field: &str, warnings: &mut Vec<ValidationWarning>) -> i32 {
    i32::try_from(value).unwrap_or_else(|_| {
        let clamped = if value < 0 { i32::MIN } else { i32::MAX };
        warnings.push(clamped_warning(task, field, value, clamped));
        clamped
    })
}

fn narrow_u32(value: i128, task: &WorkflowTask, field: &str, warnings: &mut Vec<ValidationWarning>) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        let clamped = if value < 0 { 0 } else { u32::MAX };
        warnings.push(clamped_warning(task, field, value, clamped));
        clamped
    })
}

/// Native formats count attempts; tasks count retries after the first.
fn retries_from_attempts(
    raw: Option<&Value>,
    task: &WorkflowTask,
    warnings: &mut Vec<ValidationWarning>,
) -> u32 {
    match integer(raw, task, "retries", warnings) {
        Some(0) | None => 0,
        Some(attempts) => narrow_u32(attempts - 1, task, "retries", warnings),
    }
}

fn clamped_warning(task: &WorkflowTask, field: &str, value: i128, clamped: impl std::fmt::Display) -> ValidationWarning {
    unrepresentable(
        task,
        field,
        format!("value {value} is out of range and was clamped to {clamped}"),
    )
}

fn unrepresentable(task: &WorkflowTask, field: &str, detail: String) -> ValidationWarning {
    ValidationWarning {
        code: ValidationCode::UnrepresentableField,
        message: format!("task '{}' field '{field}': {detail}", task.id),
        path: Some(format!("tasks[{}].{field}", task.id)),
    }
}

fn required_array<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>, String> {
    map.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing array field '{key}'"))
}

fn string_set(map: &Map<String, Value>, key: &str) -> std::collections::BTreeSet<String> {
    map.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn malformed(backend: BackendKind, message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::Validation, message)
        .with_backend(backend)
        .with_operation(AdapterOperation::Convert)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition::new("ingest", "ingest", "1.2.0")
            .task(WorkflowTask::new("fetch", "http").retries(2).priority(5))
            .task(
                WorkflowTask::new("store", "db")
                    .depends_on(["fetch"])
                    .timeout(Duration::from_secs(3))
                    .input_function("normalize"),
            )
            .output_task("store")
    }

    #[test]
    fn durable_documents_keep_every_field() {
        let converted = to_native(BackendKind::DurableWorkflow, &sample());
        assert!(converted.warnings.is_empty());

        let restored = from_native(&converted.value).expect("document should parse");
        assert_eq!(restored.value, sample());
    }

    #[test]
    fn job_queue_flows_report_dropped_transform_hooks() {
        let converted = to_native(BackendKind::JobQueue, &sample());

        assert_eq!(converted.warnings.len(), 1);
        assert_eq!(
            converted.warnings[0].path.as_deref(),
            Some("tasks[store].inputFunction")
        );
        let restored = from_native(&converted.value).expect("document should parse");
        let store = restored.value.find_task("store").expect("store task");
        assert_eq!(store.input_function, None);
        assert_eq!(store.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn visual_graphs_rebuild_dependencies_from_connections() {
        let converted = to_native(BackendKind::VisualAutomation, &sample());
        assert!(converted.warnings.iter().any(|w| w.message.contains("'priority'")));

        let restored = from_native(&converted.value).expect("document should parse");
        let store = restored.value.find_task("store").expect("store task");
        assert!(store.dependencies.contains("fetch"));
        assert_eq!(restored.value.output_task.as_deref(), Some("store"));
    }

    #[test]
    fn documents_missing_required_fields_are_rejected() {
        let native = NativeWorkflow {
            backend: BackendKind::JobQueue,
            document: json!({ "queueName": "ingest" }),
        };
        let error = from_native(&native).expect_err("flowId is required");
        assert_eq!(error.kind, CoreErrorKind::Validation);
        assert_eq!(error.operation, Some(AdapterOperation::Convert));
    }
}
