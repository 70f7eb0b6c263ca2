use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::adapters::{JobSource, OrchestrationAdapter};
use crate::migration::{
    JobMigrationRecord, MigrationOutcome, MigrationReport, SkipReason,
};
use crate::models::{
    AdapterOperation, CoreError, CoreErrorKind, CoreResult, ExecutionOptions, ExecutionQuery,
    JobDescriptor, JobStatus,
};
use crate::monitor::{StatusMonitor, with_retry};
use crate::versioning::VersionRegistry;

/// Idempotency key for a migrated job. Queue backends number jobs per queue,
/// so the source queue is part of the key.
pub fn migration_key(queue: &str, job_id: &str) -> String {
    format!("{queue}:{job_id}")
}

#[derive(Clone, Debug, PartialEq)]
pub struct MigrationConfig {
    pub queue: String,
    pub dry_run: bool,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub drain_source: bool,
    /// Source job name to target workflow id. Unmapped names are used as the
    /// workflow id unchanged.
    pub workflow_mapping: BTreeMap<String, String>,
}

impl MigrationConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            dry_run: false,
            concurrency: 1,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            drain_source: false,
            workflow_mapping: BTreeMap::new(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn drain_source(mut self, drain_source: bool) -> Self {
        self.drain_source = drain_source;
        self
    }

    pub fn map_workflow(mut self, job_name: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        self.workflow_mapping
            .insert(job_name.into(), workflow_id.into());
        self
    }

    fn target_workflow<'a>(&'a self, job: &'a JobDescriptor) -> &'a str {
        self.workflow_mapping
            .get(&job.name)
            .map(String::as_str)
            .unwrap_or(job.name.as_str())
    }
}

/// Moves in-flight jobs from a source backend's queue onto a target adapter.
///
/// Each job is handled independently: terminal jobs are skipped, jobs the
/// target already knows (by [`migration_key`] within the target workflow) are skipped, and
/// the rest are submitted. A failing job is recorded and never stops the run.
#[derive(Clone)]
pub struct MigrationCoordinator {
    source: Arc<dyn JobSource>,
    target: Arc<dyn OrchestrationAdapter>,
    registry: Option<Arc<VersionRegistry>>,
    monitor: Option<Arc<StatusMonitor>>,
}

impl MigrationCoordinator {
    pub fn new(source: Arc<dyn JobSource>, target: Arc<dyn OrchestrationAdapter>) -> Self {
        Self {
            source,
            target,
            registry: None,
            monitor: None,
        }
    }

    /// Routes submissions to the task queue of the latest registered version
    /// of the target workflow.
    pub fn with_registry(mut self, registry: Arc<VersionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Relays every migrated execution to the monitor.
    pub fn with_monitor(mut self, monitor: Arc<StatusMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub async fn run(&self, config: &MigrationConfig) -> CoreResult<MigrationReport> {
        let source: &dyn JobSource = self.source.as_ref();
        let queue = config.queue.as_str();
        let jobs = with_retry(
            move || source.list_jobs(queue),
            config.retry_attempts,
            config.retry_delay,
        )
        .await
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Migration,
                format!("failed to list jobs in queue '{}': {}", config.queue, error.message),
            )
            .with_operation(AdapterOperation::ListJobs)
        })?;

        tracing::info!(
            queue = %config.queue,
            jobs_found = jobs.len(),
            dry_run = config.dry_run,
            concurrency = config.concurrency,
            "starting job migration"
        );

        let records = if config.concurrency <= 1 || jobs.len() <= 1 {
            let mut records = Vec::with_capacity(jobs.len());
            for job in jobs {
                records.push(self.migrate_job(config, job).await);
            }
            records
        } else {
            self.run_pool(config, jobs).await
        };

        let report = MigrationReport::new(config.queue.clone(), config.dry_run, records);
        tracing::info!(
            queue = %config.queue,
            migrated = report.summary.migrated_count,
            skipped = report.summary.skipped_count,
            failed = report.summary.failed_count,
            would_migrate = report.summary.would_migrate_count,
            "job migration finished"
        );
        Ok(report)
    }

    /// Fixed-size pool of workers draining a shared job list. Records are put
    /// back into source order afterwards.
    async fn run_pool(
        &self,
        config: &MigrationConfig,
        jobs: Vec<JobDescriptor>,
    ) -> Vec<JobMigrationRecord> {
        let total = jobs.len();
        let pending: Arc<Mutex<VecDeque<(usize, JobDescriptor)>>> =
            Arc::new(Mutex::new(jobs.iter().cloned().enumerate().collect()));
        let config = Arc::new(config.clone());

        let mut workers = Vec::new();
        for _ in 0..config.concurrency.min(total) {
            let coordinator = self.clone();
            let pending = pending.clone();
            let config = config.clone();
            workers.push(tokio::spawn(async move {
                let mut done = Vec::new();
                loop {
                    let next = match pending.lock() {
                        Ok(mut queue) => queue.pop_front(),
                        Err(_) => None,
                    };
                    let Some((index, job)) = next else {
                        break;
                    };
                    done.push((index, coordinator.migrate_job(&config, job).await));
                }
                done
            }));
        }

        let mut slots: Vec<Option<JobMigrationRecord>> = vec![None; total];
        for worker in workers {
            match worker.await {
                Ok(done) => {
                    for (index, record) in done {
                        slots[index] = Some(record);
                    }
                }
                Err(error) => {
                    tracing::error!(message = %error, "migration worker stopped unexpectedly");
                }
            }
        }

        slots
            .into_iter()
            .zip(jobs)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| JobMigrationRecord {
                    job_id: job.id,
                    job_name: job.name,
                    source_status: None,
                    outcome: MigrationOutcome::Failed(CoreError::new(
                        CoreErrorKind::Internal,
                        "migration worker stopped before handling this job",
                    )),
                    source_removed: false,
                })
            })
            .collect()
    }

    async fn migrate_job(&self, config: &MigrationConfig, job: JobDescriptor) -> JobMigrationRecord {
        let mut record = JobMigrationRecord {
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            source_status: None,
            outcome: MigrationOutcome::WouldMigrate,
            source_removed: false,
        };

        record.outcome = match self.decide(config, &job, &mut record).await {
            Ok(outcome) => outcome,
            Err(error) => MigrationOutcome::Failed(error),
        };

        match &record.outcome {
            MigrationOutcome::Migrated { execution_id } => tracing::info!(
                queue = %config.queue,
                job_id = %job.id,
                execution_id = %execution_id,
                "job migrated"
            ),
            MigrationOutcome::WouldMigrate => tracing::info!(
                queue = %config.queue,
                job_id = %job.id,
                "job would be migrated"
            ),
            MigrationOutcome::Skipped(reason) => tracing::debug!(
                queue = %config.queue,
                job_id = %job.id,
                reason = ?reason,
                "job skipped"
            ),
            MigrationOutcome::Failed(error) => tracing::error!(
                queue = %config.queue,
                job_id = %job.id,
                kind = ?error.kind,
                message = %error.message,
                "job migration failed"
            ),
        }
        record
    }

    async fn decide(
        &self,
        config: &MigrationConfig,
        job: &JobDescriptor,
        record: &mut JobMigrationRecord,
    ) -> CoreResult<MigrationOutcome> {
        let source: &dyn JobSource = self.source.as_ref();
        let target: &dyn OrchestrationAdapter = self.target.as_ref();
        let queue = config.queue.as_str();
        let job_id = job.id.as_str();

        let status = with_retry(
            move || source.job_status(queue, job_id),
            config.retry_attempts,
            config.retry_delay,
        )
        .await?;
        record.source_status = Some(status);
        if status.is_terminal() {
            return Ok(MigrationOutcome::Skipped(SkipReason::SourceTerminal(status)));
        }

        let workflow_id = config.target_workflow(job);
        let key = migration_key(queue, job_id);
        let lookup = ExecutionQuery::by_idempotency_key(key.as_str()).workflow(workflow_id);
        let lookup_ref = &lookup;
        let existing = with_retry(
            move || target.list_executions(lookup_ref.clone()),
            config.retry_attempts,
            config.retry_delay,
        )
        .await?;
        if let Some(execution) = existing
            .items
            .iter()
            .find(|execution| execution.status.is_live() || execution.status == JobStatus::Completed)
        {
            return Ok(MigrationOutcome::Skipped(SkipReason::AlreadyMigrated {
                execution_id: execution.execution_id.clone(),
            }));
        }

        if config.dry_run {
            return Ok(MigrationOutcome::WouldMigrate);
        }

        let options = self.submission_options(config, job, key)?;
        let data = &job.data;
        let options_ref = &options;
        let execution = with_retry(
            move || target.execute_workflow(workflow_id, data.clone(), options_ref.clone()),
            config.retry_attempts,
            config.retry_delay,
        )
        .await
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Migration,
                format!(
                    "job '{job_id}' could not be submitted after {} attempts: {}",
                    config.retry_attempts.max(1),
                    error.message
                ),
            )
            .attribute(target.kind(), Some(workflow_id), AdapterOperation::Execute)
        })?;

        if let Some(monitor) = &self.monitor
            && let Err(error) = monitor.relay_execution(&execution)
        {
            tracing::warn!(job_id, message = %error.message, "failed to relay migrated execution");
        }

        if config.drain_source {
            match source.remove_job(queue, job_id).await {
                Ok(removed) => record.source_removed = removed,
                Err(error) => tracing::warn!(
                    queue,
                    job_id,
                    message = %error.message,
                    "migrated job could not be removed from source"
                ),
            }
        }

        Ok(MigrationOutcome::Migrated {
            execution_id: execution.execution_id,
        })
    }

    fn submission_options(
        &self,
        config: &MigrationConfig,
        job: &JobDescriptor,
        key: String,
    ) -> CoreResult<ExecutionOptions> {
        let mut options = ExecutionOptions::new()
            .idempotency_key(key)
            .metadata("sourceQueue", json!(config.queue))
            .metadata("sourceJobId", json!(job.id))
            .metadata(
                "sourceTimestamp",
                json!(crate::models::serde_time::unix_millis::to_millis(job.timestamp)),
            );
        if let Some(priority) = job.opts.priority {
            options = options.priority(priority);
        }

        if let Some(registry) = &self.registry {
            let workflow = config.target_workflow(job);
            let name = workflow.split_once('@').map_or(workflow, |(name, _)| name);
            if let Some(version) = registry.get_latest_version(name)? {
                options = options
                    .task_queue(version.task_queue)
                    .metadata("buildId", json!(version.build_id));
            }
        }
        Ok(options)
    }
}
