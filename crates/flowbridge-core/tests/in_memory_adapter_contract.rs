use std::sync::Arc;
use std::time::Duration;

use flowbridge_core::adapters::{InMemoryAdapter, JobSource, NativeWorkflow, OrchestrationAdapter};
use flowbridge_core::config::AdapterConfig;
use flowbridge_core::models::{
    AdapterOperation, BackendKind, CoreError, CoreErrorKind, ErrorAction, ErrorContext,
    ErrorDecision, ExecutionEventKind, ExecutionOptions, ExecutionQuery, HealthStatus, JobStatus,
    ValidationCode, WorkflowDefinition, WorkflowQuery, WorkflowTask,
};
use flowbridge_core::registry;
use serde_json::json;

fn adapter(kind: BackendKind) -> InMemoryAdapter {
    InMemoryAdapter::new(registry::backend(kind).cloned().unwrap())
}

fn pipeline() -> WorkflowDefinition {
    WorkflowDefinition::new("ingest", "ingest", "1.0.0")
        .task(WorkflowTask::new("fetch", "http"))
        .task(WorkflowTask::new("store", "db").depends_on(["fetch"]))
        .output_task("store")
}

async fn started(adapter: &InMemoryAdapter, definition: WorkflowDefinition) -> String {
    let workflow_id = adapter.deploy_workflow(definition).await.unwrap();
    adapter
        .execute_workflow(&workflow_id, json!({"source": "s3"}), ExecutionOptions::new())
        .await
        .unwrap()
        .execution_id
}

#[tokio::test]
async fn deploying_twice_yields_same_id() {
    let adapter = adapter(BackendKind::DurableWorkflow);

    let first = adapter.deploy_workflow(pipeline()).await.unwrap();
    let second = adapter.deploy_workflow(pipeline()).await.unwrap();

    assert_eq!(first, "ingest@1.0.0");
    assert_eq!(first, second);
    let page = adapter
        .list_workflows(WorkflowQuery::named("ingest"))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].task_count, 2);
}

#[tokio::test]
async fn invalid_definitions_are_not_deployed() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let cyclic = WorkflowDefinition::new("loop", "loop", "1.0.0")
        .task(WorkflowTask::new("a", "noop").depends_on(["b"]))
        .task(WorkflowTask::new("b", "noop").depends_on(["a"]));

    let error = adapter.deploy_workflow(cyclic).await.unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Validation);
    assert_eq!(error.operation, Some(AdapterOperation::Deploy));
    assert_eq!(error.workflow.as_deref(), Some("loop@1.0.0"));
    assert_eq!(
        adapter
            .list_workflows(WorkflowQuery::default())
            .await
            .unwrap()
            .total,
        0
    );
}

#[test]
fn backend_limits_apply_to_validation() {
    let queue = adapter(BackendKind::JobQueue);
    let hooked = WorkflowDefinition::new("hooked", "hooked", "1.0.0")
        .task(WorkflowTask::new("a", "noop").input_function("normalize"));
    assert!(
        queue
            .validate_workflow_definition(&hooked)
            .has_error(ValidationCode::UnsupportedHook)
    );

    let visual = adapter(BackendKind::VisualAutomation);
    let mut large = WorkflowDefinition::new("large", "large", "1.0.0");
    for index in 0..101 {
        large = large.task(WorkflowTask::new(format!("t{index}"), "noop"));
    }
    assert!(
        visual
            .validate_workflow_definition(&large)
            .has_error(ValidationCode::TooManyTasks)
    );

    let durable = adapter(BackendKind::DurableWorkflow);
    let empty = WorkflowDefinition::new("empty", "bad@name", "1.0.0");
    let result = durable.validate_workflow_definition(&empty);
    assert!(result.has_error(ValidationCode::NoTasks));
    assert!(result.has_error(ValidationCode::IdentifierFormat));
}

#[tokio::test]
async fn executing_undeployed_workflow_is_not_found() {
    let adapter = adapter(BackendKind::DurableWorkflow);

    let error = adapter
        .execute_workflow("ghost@1.0.0", json!({}), ExecutionOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert_eq!(error.backend, Some(BackendKind::DurableWorkflow));
}

#[tokio::test]
async fn idempotency_key_returns_existing_execution() {
    let adapter = adapter(BackendKind::JobQueue);
    let workflow_id = adapter.deploy_workflow(pipeline()).await.unwrap();
    let options = ExecutionOptions::new().idempotency_key("job-42");

    let first = adapter
        .execute_workflow(&workflow_id, json!({}), options.clone())
        .await
        .unwrap();
    let second = adapter
        .execute_workflow(&workflow_id, json!({}), options)
        .await
        .unwrap();
    let other = adapter
        .execute_workflow(
            &workflow_id,
            json!({}),
            ExecutionOptions::new().idempotency_key("job-43"),
        )
        .await
        .unwrap();

    assert_eq!(first.execution_id, second.execution_id);
    assert_ne!(first.execution_id, other.execution_id);
    let page = adapter
        .list_executions(ExecutionQuery::by_idempotency_key("job-42"))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(first.status, JobStatus::Pending);
    assert_eq!(first.task_queue.as_deref(), Some("ingest"));
}

#[tokio::test]
async fn tasks_run_in_dependency_order_and_produce_output() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let execution_id = started(&adapter, pipeline()).await;

    let blocked = adapter.start_task(&execution_id, "store").unwrap_err();
    assert_eq!(blocked.kind, CoreErrorKind::Execution);

    adapter.start_task(&execution_id, "fetch").unwrap();
    adapter
        .complete_task(&execution_id, "fetch", json!({"rows": 3}))
        .unwrap();
    let midway = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(midway.status, JobStatus::Running);
    assert_eq!(midway.progress, Some(50));

    adapter.start_task(&execution_id, "store").unwrap();
    adapter
        .complete_task(&execution_id, "store", json!({"stored": 3}))
        .unwrap();

    let finished = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.output, Some(json!({"stored": 3})));
    assert_eq!(finished.progress, Some(100));
    assert!(finished.end_time.is_some());

    let history = adapter.get_execution_history(&execution_id).await.unwrap();
    assert_eq!(history[0].kind, ExecutionEventKind::ExecutionStarted);
    assert!(history.iter().any(|event| event.kind
        == ExecutionEventKind::StatusChanged {
            from: JobStatus::Running,
            to: JobStatus::Completed,
        }));
    assert!(
        history
            .windows(2)
            .all(|pair| pair[0].sequence < pair[1].sequence)
    );
}

#[tokio::test]
async fn cancellation_waits_for_acknowledgement() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let execution_id = started(&adapter, pipeline()).await;

    assert!(
        adapter
            .cancel_execution(&execution_id, Some("operator".into()))
            .await
            .unwrap()
    );
    let requested = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(requested.status, JobStatus::Pending);

    assert!(adapter.acknowledge_cancellation(&execution_id).unwrap());
    let canceled = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);

    assert!(!adapter.cancel_execution(&execution_id, None).await.unwrap());
    assert!(!adapter.terminate_execution(&execution_id, None).await.unwrap());
}

#[tokio::test]
async fn termination_is_immediate() {
    let adapter = adapter(BackendKind::JobQueue);
    let execution_id = started(&adapter, pipeline()).await;

    assert!(
        adapter
            .terminate_execution(&execution_id, Some("stuck".into()))
            .await
            .unwrap()
    );
    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.status, JobStatus::Terminated);
    assert_eq!(state.error.as_deref(), Some("stuck"));
}

#[tokio::test]
async fn execution_deadline_times_out() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let workflow_id = adapter.deploy_workflow(pipeline()).await.unwrap();
    let execution = adapter
        .execute_workflow(
            &workflow_id,
            json!({}),
            ExecutionOptions::new().timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    let before = adapter
        .enforce_timeouts_at(execution.start_time + Duration::from_millis(500))
        .unwrap();
    assert!(before.is_empty());

    let expired = adapter
        .enforce_timeouts_at(execution.start_time + Duration::from_secs(2))
        .unwrap();
    assert_eq!(expired, vec![execution.execution_id.clone()]);
    let state = adapter
        .get_execution_state(&execution.execution_id)
        .await
        .unwrap();
    assert_eq!(state.status, JobStatus::Timeout);
}

#[tokio::test]
async fn unbounded_timeouts_never_expire() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let definition = WorkflowDefinition::new("forever", "forever", "1.0.0")
        .task(WorkflowTask::new("wait", "sleep").timeout(Duration::MAX));
    let workflow_id = adapter.deploy_workflow(definition).await.unwrap();
    let execution = adapter
        .execute_workflow(&workflow_id, json!({}), ExecutionOptions::new().timeout(Duration::MAX))
        .await
        .unwrap();
    adapter.start_task(&execution.execution_id, "wait").unwrap();

    let expired = adapter
        .enforce_timeouts_at(execution.start_time + Duration::from_secs(86_400 * 365))
        .unwrap();

    assert!(expired.is_empty());
    let state = adapter
        .get_execution_state(&execution.execution_id)
        .await
        .unwrap();
    assert_eq!(state.status, JobStatus::Running);
}

#[tokio::test]
async fn running_task_timeout_times_out_execution() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let definition = WorkflowDefinition::new("slow", "slow", "1.0.0")
        .task(WorkflowTask::new("wait", "sleep").timeout(Duration::from_secs(5)));
    let execution_id = started(&adapter, definition).await;
    adapter.start_task(&execution_id, "wait").unwrap();

    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    let task_started = state.tasks["wait"].start_time.unwrap();
    let expired = adapter
        .enforce_timeouts_at(task_started + Duration::from_secs(6))
        .unwrap();

    assert_eq!(expired, vec![execution_id.clone()]);
    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.tasks["wait"].status, JobStatus::Timeout);
}

#[tokio::test]
async fn signaling_depends_on_capability() {
    let durable = adapter(BackendKind::DurableWorkflow);
    let execution_id = started(&durable, pipeline()).await;
    assert!(
        durable
            .signal_workflow(&execution_id, "approve", Some(json!({"by": "ops"})))
            .await
            .unwrap()
    );
    let history = durable.get_execution_history(&execution_id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(
        last.kind,
        ExecutionEventKind::SignalReceived {
            signal: "approve".into()
        }
    );
    assert_eq!(last.payload, Some(json!({"by": "ops"})));

    let queue = adapter(BackendKind::JobQueue);
    let execution_id = started(&queue, pipeline()).await;
    assert!(
        !queue
            .signal_workflow(&execution_id, "approve", None)
            .await
            .unwrap()
    );
    let history = queue.get_execution_history(&execution_id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn task_retry_budget_applies_without_handler() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let definition = WorkflowDefinition::new("flaky", "flaky", "1.0.0")
        .task(WorkflowTask::new("call", "http").retries(1));
    let execution_id = started(&adapter, definition).await;

    adapter.start_task(&execution_id, "call").unwrap();
    let first = adapter.fail_task(&execution_id, "call", "503").unwrap();
    assert_eq!(first.action, ErrorAction::Retry);
    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.tasks["call"].status, JobStatus::Pending);
    assert_eq!(state.tasks["call"].retry_count, 1);

    adapter.start_task(&execution_id, "call").unwrap();
    let second = adapter.fail_task(&execution_id, "call", "503").unwrap();
    assert_eq!(second.action, ErrorAction::Fail);
    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("503"));
}

#[tokio::test]
async fn registered_handler_decides_fault_outcome() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    adapter.register_error_handler(Arc::new(|error: &CoreError, context: &ErrorContext| {
        assert_eq!(error.kind, CoreErrorKind::Execution);
        if context.attempt_number == Some(1) {
            ErrorDecision::retry(Duration::from_millis(250))
        } else {
            ErrorDecision::compensate(json!({"refund": context.entity_id}))
        }
    }));
    let definition =
        WorkflowDefinition::new("pay", "pay", "1.0.0").task(WorkflowTask::new("charge", "payment"));
    let execution_id = started(&adapter, definition).await;

    adapter.start_task(&execution_id, "charge").unwrap();
    let retry = adapter.fail_task(&execution_id, "charge", "declined").unwrap();
    assert_eq!(retry.action, ErrorAction::Retry);

    adapter.start_task(&execution_id, "charge").unwrap();
    let compensate = adapter.fail_task(&execution_id, "charge", "declined").unwrap();
    assert_eq!(compensate.action, ErrorAction::Compensate);

    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(
        state.tasks["charge"].compensation,
        Some(json!({"refund": "charge"}))
    );
    let history = adapter.get_execution_history(&execution_id).await.unwrap();
    assert!(history.iter().any(|event| event.kind
        == ExecutionEventKind::TaskRetryScheduled {
            task_id: "charge".into(),
            attempt: 2,
            delay_ms: 250,
        }));
}

#[tokio::test]
async fn ignored_faults_let_execution_complete() {
    let adapter = adapter(BackendKind::JobQueue);
    adapter.register_error_handler(Arc::new(|_: &CoreError, _: &ErrorContext| {
        ErrorDecision::ignore()
    }));
    let definition = WorkflowDefinition::new("best-effort", "best-effort", "1.0.0")
        .task(WorkflowTask::new("notify", "email"));
    let execution_id = started(&adapter, definition).await;

    adapter.start_task(&execution_id, "notify").unwrap();
    adapter
        .fail_task(&execution_id, "notify", "smtp down")
        .unwrap();

    let state = adapter.get_execution_state(&execution_id).await.unwrap();
    assert_eq!(state.status, JobStatus::Completed);
}

#[tokio::test]
async fn unreachable_backend_reports_unhealthy() {
    let adapter = adapter(BackendKind::VisualAutomation);
    assert_eq!(adapter.check_health().await.status, HealthStatus::Healthy);

    adapter.set_reachable(false).unwrap();
    let report = adapter.check_health().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.details.error.is_some());

    let error = adapter.deploy_workflow(pipeline()).await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Connection);
}

#[tokio::test]
async fn slow_backend_exceeds_operation_timeout() {
    let config = AdapterConfig::new(BackendKind::DurableWorkflow).timeouts(None, Some(5));
    let adapter = InMemoryAdapter::from_config(&config).unwrap();
    adapter.set_latency(Duration::from_millis(50)).unwrap();

    let error = adapter.deploy_workflow(pipeline()).await.unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert!(error.is_retryable());
}

#[tokio::test]
async fn schedules_can_be_paused_and_resumed() {
    let adapter = adapter(BackendKind::JobQueue);
    let workflow_id = adapter.deploy_workflow(pipeline()).await.unwrap();

    let invalid = adapter
        .schedule_workflow(&workflow_id, "every minute", None)
        .await
        .unwrap_err();
    assert_eq!(invalid.kind, CoreErrorKind::Validation);

    let schedule_id = adapter
        .schedule_workflow(&workflow_id, "*/5 * * * *", Some(json!({"full": true})))
        .await
        .unwrap();
    adapter.pause_schedule(&schedule_id).unwrap();
    assert!(adapter.schedule(&schedule_id).unwrap().unwrap().paused);
    adapter.resume_schedule(&schedule_id).unwrap();

    let schedule = adapter.schedule(&schedule_id).unwrap().unwrap();
    assert!(!schedule.paused);
    assert_eq!(schedule.workflow_id, workflow_id);
    assert_eq!(
        adapter.pause_schedule("missing").unwrap_err().kind,
        CoreErrorKind::NotFound
    );
}

#[tokio::test]
async fn submitted_executions_are_visible_as_jobs() {
    let adapter = adapter(BackendKind::JobQueue);
    let workflow_id = adapter.deploy_workflow(pipeline()).await.unwrap();
    adapter
        .execute_workflow(
            &workflow_id,
            json!({}),
            ExecutionOptions::new()
                .idempotency_key("order-7")
                .task_queue("orders")
                .priority(3),
        )
        .await
        .unwrap();

    let jobs = adapter.list_jobs("orders").await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "order-7");
    assert_eq!(jobs[0].opts.priority, Some(3));
    assert_eq!(
        adapter.job_status("orders", "order-7").await.unwrap(),
        JobStatus::Pending
    );
    assert!(adapter.remove_job("orders", "order-7").await.unwrap());
    assert!(adapter.list_jobs("orders").await.unwrap().is_empty());
}

#[tokio::test]
async fn idempotency_keys_are_scoped_to_the_workflow() {
    let adapter = adapter(BackendKind::DurableWorkflow);
    let ingest = adapter.deploy_workflow(pipeline()).await.unwrap();
    let audit = adapter
        .deploy_workflow(
            WorkflowDefinition::new("audit", "audit", "1.0.0").task(WorkflowTask::new("log", "sink")),
        )
        .await
        .unwrap();
    let options = ExecutionOptions::new().idempotency_key("1");

    let first = adapter
        .execute_workflow(&ingest, json!({}), options.clone())
        .await
        .unwrap();
    let second = adapter
        .execute_workflow(&audit, json!({}), options)
        .await
        .unwrap();

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(second.workflow_id, audit);
}

#[tokio::test]
async fn resubmitting_after_failure_replaces_the_queued_job() {
    let adapter = adapter(BackendKind::JobQueue);
    let definition =
        WorkflowDefinition::new("charge", "charge", "1.0.0").task(WorkflowTask::new("bill", "stripe"));
    let workflow_id = adapter.deploy_workflow(definition).await.unwrap();
    let options = ExecutionOptions::new()
        .idempotency_key("order-9")
        .task_queue("orders");

    let failed = adapter
        .execute_workflow(&workflow_id, json!({}), options.clone())
        .await
        .unwrap();
    adapter.start_task(&failed.execution_id, "bill").unwrap();
    adapter.fail_task(&failed.execution_id, "bill", "card declined").unwrap();
    assert_eq!(adapter.job_status("orders", "order-9").await.unwrap(), JobStatus::Failed);

    let retried = adapter
        .execute_workflow(&workflow_id, json!({}), options)
        .await
        .unwrap();

    assert_ne!(retried.execution_id, failed.execution_id);
    assert_eq!(adapter.list_jobs("orders").await.unwrap().len(), 1);
    assert_eq!(adapter.job_status("orders", "order-9").await.unwrap(), JobStatus::Pending);
}

#[tokio::test]
async fn expired_executions_are_purged() {
    let config = AdapterConfig::new(BackendKind::JobQueue).option("retentionMs", json!(1_000));
    let adapter = InMemoryAdapter::from_config(&config).unwrap();
    let execution_id = started(&adapter, pipeline()).await;
    adapter.terminate_execution(&execution_id, None).await.unwrap();
    let ended = adapter
        .get_execution_state(&execution_id)
        .await
        .unwrap()
        .end_time
        .unwrap();

    assert_eq!(adapter.purge_expired_at(ended).unwrap(), 0);
    assert_eq!(
        adapter
            .purge_expired_at(ended + Duration::from_secs(2))
            .unwrap(),
        1
    );
    assert_eq!(
        adapter
            .get_execution_state(&execution_id)
            .await
            .unwrap_err()
            .kind,
        CoreErrorKind::NotFound
    );
}

#[test]
fn native_documents_for_another_backend_are_rejected() {
    let durable = adapter(BackendKind::DurableWorkflow);
    let queue = adapter(BackendKind::JobQueue);

    let native = queue.convert_to_native_format(&pipeline()).unwrap().value;
    let error = durable.convert_from_native_format(&native).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Validation);
    assert_eq!(error.operation, Some(AdapterOperation::Convert));

    let restored = queue.convert_from_native_format(&native).unwrap().value;
    assert_eq!(restored, pipeline());
}

#[test]
fn out_of_range_native_numbers_are_clamped_with_warnings() {
    let durable = adapter(BackendKind::DurableWorkflow);
    let native = NativeWorkflow {
        backend: BackendKind::DurableWorkflow,
        document: json!({
            "workflowId": "big",
            "workflowType": "big",
            "version": "1.0.0",
            "activities": [{
                "activityId": "spin",
                "activityType": "cpu",
                "priority": 4_294_967_297_u64,
                "retryPolicy": { "maximumAttempts": 4_294_967_298_u64 },
            }],
        }),
    };

    let converted = durable.convert_from_native_format(&native).unwrap();
    let task = converted.value.find_task("spin").unwrap();

    assert_eq!(task.priority, i32::MAX);
    assert_eq!(task.retries, u32::MAX);
    let paths: Vec<_> = converted
        .warnings
        .iter()
        .map(|warning| (warning.code, warning.path.as_deref()))
        .collect();
    assert_eq!(
        paths,
        vec![
            (ValidationCode::UnrepresentableField, Some("tasks[spin].priority")),
            (ValidationCode::UnrepresentableField, Some("tasks[spin].retries")),
        ]
    );
}
