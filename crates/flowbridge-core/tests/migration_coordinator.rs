use std::sync::Arc;
use std::time::Duration;

use flowbridge_core::adapters::{InMemoryAdapter, JobSource, OrchestrationAdapter};
use flowbridge_core::migration::{
    MigrationConfig, MigrationCoordinator, MigrationOutcome, SkipReason, migration_key,
};
use flowbridge_core::models::{
    BackendKind, CoreErrorKind, ExecutionQuery, JobDescriptor, JobStatus, WorkflowDefinition,
    WorkflowTask,
};
use flowbridge_core::monitor::{MonitorStatus, StatusMonitor};
use flowbridge_core::registry;
use flowbridge_core::versioning::{VersionRegistration, VersionRegistry};
use serde_json::json;

const QUEUE: &str = "legacy-email";

fn backend(kind: BackendKind) -> Arc<InMemoryAdapter> {
    Arc::new(InMemoryAdapter::new(registry::backend(kind).cloned().unwrap()))
}

async fn target() -> Arc<InMemoryAdapter> {
    let target = backend(BackendKind::DurableWorkflow);
    target
        .deploy_workflow(
            WorkflowDefinition::new("email", "email", "1.0.0")
                .task(WorkflowTask::new("render", "template"))
                .task(WorkflowTask::new("send", "smtp").depends_on(["render"])),
        )
        .await
        .unwrap();
    target
}

fn seeded_source(jobs: &[(&str, JobStatus)]) -> Arc<InMemoryAdapter> {
    let source = backend(BackendKind::JobQueue);
    for (id, status) in jobs {
        source
            .seed_job(
                QUEUE,
                JobDescriptor::new(*id, "send-email", json!({"to": format!("{id}@example.com")})),
                *status,
            )
            .unwrap();
    }
    source
}

fn config() -> MigrationConfig {
    MigrationConfig::new(QUEUE)
        .map_workflow("send-email", "email@1.0.0")
        .retry(3, Duration::from_millis(1))
}

fn coordinator(source: &Arc<InMemoryAdapter>, target: &Arc<InMemoryAdapter>) -> MigrationCoordinator {
    MigrationCoordinator::new(source.clone(), target.clone())
}

#[tokio::test]
async fn live_jobs_migrate_and_terminal_jobs_are_skipped() {
    let source = seeded_source(&[
        ("j1", JobStatus::Pending),
        ("j2", JobStatus::Running),
        ("j3", JobStatus::Completed),
    ]);
    let target = target().await;

    let report = coordinator(&source, &target).run(&config()).await.unwrap();

    assert_eq!(report.jobs_found, 3);
    assert_eq!(report.summary.migrated_count, 2);
    assert_eq!(report.summary.skipped_count, 1);
    assert_eq!(report.summary.failed_count, 0);
    assert_eq!(
        report.record("j3").unwrap().outcome,
        MigrationOutcome::Skipped(SkipReason::SourceTerminal(JobStatus::Completed))
    );

    let submitted = target
        .list_executions(ExecutionQuery::by_idempotency_key(migration_key(QUEUE, "j1")))
        .await
        .unwrap();
    assert_eq!(submitted.total, 1);
    let execution = &submitted.items[0];
    assert_eq!(execution.workflow_id, "email@1.0.0");
    assert_eq!(execution.input, json!({"to": "j1@example.com"}));
}

#[tokio::test]
async fn rerunning_a_migration_submits_nothing_new() {
    let source = seeded_source(&[("j1", JobStatus::Pending), ("j2", JobStatus::Waiting)]);
    let target = target().await;
    let coordinator = coordinator(&source, &target);

    let first = coordinator.run(&config()).await.unwrap();
    let second = coordinator.run(&config()).await.unwrap();

    assert_eq!(first.summary.migrated_count, 2);
    assert_eq!(second.summary.migrated_count, 0);
    assert_eq!(second.summary.skipped_count, 2);
    let MigrationOutcome::Migrated { execution_id } = &first.record("j1").unwrap().outcome else {
        panic!("j1 should have migrated");
    };
    assert_eq!(
        second.record("j1").unwrap().outcome,
        MigrationOutcome::Skipped(SkipReason::AlreadyMigrated {
            execution_id: execution_id.clone()
        })
    );
    let all = target.list_executions(ExecutionQuery::default()).await.unwrap();
    assert_eq!(all.total, 2);
}

#[tokio::test]
async fn dry_run_submits_nothing() {
    let source = seeded_source(&[("j1", JobStatus::Pending), ("j2", JobStatus::Failed)]);
    let target = target().await;

    let report = coordinator(&source, &target)
        .run(&config().dry_run(true))
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.summary.migrated_count, 0);
    assert_eq!(report.summary.would_migrate_count, 1);
    assert_eq!(report.summary.skipped_count, 1);
    assert_eq!(
        target
            .list_executions(ExecutionQuery::default())
            .await
            .unwrap()
            .total,
        0
    );
}

#[tokio::test]
async fn transient_submission_failures_are_retried() {
    let source = seeded_source(&[("j1", JobStatus::Pending)]);
    let target = target().await;
    target.fail_next_submissions(2).unwrap();

    let report = coordinator(&source, &target).run(&config()).await.unwrap();

    assert_eq!(report.summary.migrated_count, 1);
    assert_eq!(report.summary.failed_count, 0);
}

#[tokio::test]
async fn persistent_failures_are_recorded_per_job() {
    let source = seeded_source(&[("j1", JobStatus::Pending), ("j2", JobStatus::Pending)]);
    let target = target().await;
    target.fail_next_submissions(3).unwrap();

    let report = coordinator(&source, &target).run(&config()).await.unwrap();

    assert_eq!(report.summary.failed_count, 1);
    assert_eq!(report.summary.migrated_count, 1);
    assert_eq!(report.failed_job_ids(), vec!["j1".to_string()]);
    let MigrationOutcome::Failed(error) = &report.record("j1").unwrap().outcome else {
        panic!("j1 should have failed");
    };
    assert_eq!(error.kind, CoreErrorKind::Migration);
    assert_eq!(error.backend, Some(BackendKind::DurableWorkflow));
    assert_eq!(error.workflow.as_deref(), Some("email@1.0.0"));
}

#[tokio::test]
async fn unmapped_jobs_target_their_own_name() {
    let source = backend(BackendKind::JobQueue);
    source
        .seed_job(
            QUEUE,
            JobDescriptor::new("j1", "unknown-flow", json!({})),
            JobStatus::Pending,
        )
        .unwrap();
    let target = target().await;

    let report = coordinator(&source, &target).run(&config()).await.unwrap();

    assert_eq!(report.summary.failed_count, 1);
    let MigrationOutcome::Failed(error) = &report.record("j1").unwrap().outcome else {
        panic!("unknown workflow should fail");
    };
    assert!(error.message.contains("unknown-flow"), "{}", error.message);
}

#[tokio::test]
async fn unreachable_source_fails_the_run() {
    let source = seeded_source(&[("j1", JobStatus::Pending)]);
    source.set_reachable(false).unwrap();
    let target = target().await;

    let error = coordinator(&source, &target).run(&config()).await.unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Migration);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_pool_keeps_source_order() {
    let ids: Vec<String> = (0..12).map(|index| format!("job-{index:02}")).collect();
    let jobs: Vec<(&str, JobStatus)> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let status = if index % 4 == 0 {
                JobStatus::Completed
            } else {
                JobStatus::Pending
            };
            (id.as_str(), status)
        })
        .collect();
    let source = seeded_source(&jobs);
    let target = target().await;

    let report = coordinator(&source, &target)
        .run(&config().concurrency(4))
        .await
        .unwrap();

    let order: Vec<&str> = report
        .records
        .iter()
        .map(|record| record.job_id.as_str())
        .collect();
    let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
    assert_eq!(order, expected);
    assert_eq!(report.summary.migrated_count, 9);
    assert_eq!(report.summary.skipped_count, 3);
}

#[tokio::test]
async fn draining_removes_migrated_jobs_from_source() {
    let source = seeded_source(&[("j1", JobStatus::Pending), ("j2", JobStatus::Completed)]);
    let target = target().await;

    let report = coordinator(&source, &target)
        .run(&config().drain_source(true))
        .await
        .unwrap();

    assert!(report.record("j1").unwrap().source_removed);
    assert!(!report.record("j2").unwrap().source_removed);
    let remaining: Vec<String> = source
        .list_jobs(QUEUE)
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(remaining, vec!["j2".to_string()]);
}

#[tokio::test]
async fn registry_and_monitor_are_consulted() {
    let source = seeded_source(&[("j1", JobStatus::Pending)]);
    let target = target().await;
    let registry = Arc::new(VersionRegistry::in_memory());
    registry
        .register_version(VersionRegistration::new("email", "1.0.0", "email-v1", "build-1"))
        .unwrap();
    let monitor = Arc::new(StatusMonitor::new());

    let report = coordinator(&source, &target)
        .with_registry(registry)
        .with_monitor(monitor.clone())
        .run(&config())
        .await
        .unwrap();

    let MigrationOutcome::Migrated { execution_id } = &report.record("j1").unwrap().outcome else {
        panic!("j1 should have migrated");
    };
    let execution = target.get_execution_state(execution_id).await.unwrap();
    assert_eq!(execution.task_queue.as_deref(), Some("email-v1"));

    let entry = monitor.get_workflow_status(execution_id).unwrap().unwrap();
    assert_eq!(entry.status, MonitorStatus::Started);
    assert_eq!(entry.metadata.get("workflowId"), Some(&json!("email@1.0.0")));
}

#[tokio::test]
async fn queues_numbering_jobs_alike_both_migrate() {
    let source = backend(BackendKind::JobQueue);
    source
        .seed_job("email", JobDescriptor::new("1", "send-email", json!({"to": "a"})), JobStatus::Pending)
        .unwrap();
    source
        .seed_job("sms", JobDescriptor::new("1", "send-sms", json!({"to": "b"})), JobStatus::Pending)
        .unwrap();
    let target = target().await;
    target
        .deploy_workflow(
            WorkflowDefinition::new("sms", "sms", "1.0.0").task(WorkflowTask::new("send", "gateway")),
        )
        .await
        .unwrap();
    let coordinator = coordinator(&source, &target);

    let email = coordinator
        .run(&MigrationConfig::new("email").map_workflow("send-email", "email@1.0.0"))
        .await
        .unwrap();
    let sms = coordinator
        .run(&MigrationConfig::new("sms").map_workflow("send-sms", "sms@1.0.0"))
        .await
        .unwrap();

    assert_eq!(email.summary.migrated_count, 1);
    assert_eq!(sms.summary.migrated_count, 1);
    let MigrationOutcome::Migrated { execution_id } = &sms.record("1").unwrap().outcome else {
        panic!("sms job should migrate, got {:?}", sms.record("1"));
    };
    let execution = target.get_execution_state(execution_id).await.unwrap();
    assert_eq!(execution.workflow_id, "sms@1.0.0");
    assert_eq!(execution.input, json!({"to": "b"}));
    assert_eq!(execution.idempotency_key.as_deref(), Some("sms:1"));
}
