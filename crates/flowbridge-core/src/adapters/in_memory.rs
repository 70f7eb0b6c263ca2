use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use serde_json::{Value, json};
use uuid::Uuid;

use crate::adapters::native::{from_native, to_native};
use crate::adapters::{
    AdapterFuture, AdapterResult, Converted, HealthFuture, JobSource, NativeWorkflow,
    OrchestrationAdapter, ensure_capability_supported,
};
use crate::config::AdapterConfig;
use crate::models::{
    AdapterOperation, BackendDescriptor, Capability, CoreError, CoreErrorKind, ErrorAction,
    ErrorContext, ErrorDecision, ErrorHandler, ExecutionEvent, ExecutionEventKind,
    ExecutionOptions, ExecutionQuery, FaultScope, HealthReport, HealthStatus, JobDescriptor,
    JobStatus, Page, TaskExecutionState, WorkflowDefinition, WorkflowExecutionState,
    WorkflowQuery, WorkflowSummary,
};
use crate::registry;

const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleInfo {
    pub schedule_id: String,
    pub workflow_id: String,
    pub cron_expression: String,
    pub input: Option<Value>,
    pub paused: bool,
}

/// In-process backend binding that honours the full adapter contract.
///
/// The backend side of an execution (tasks starting, finishing, failing,
/// cancellation being acknowledged) is driven explicitly through the
/// `start_task`, `complete_task`, `fail_task`, `acknowledge_cancellation` and
/// `enforce_timeouts_at` reports.
pub struct InMemoryAdapter {
    descriptor: BackendDescriptor,
    default_task_queue: Option<String>,
    retention: Duration,
    connection_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    error_handler: Mutex<Option<ErrorHandler>>,
    state: Mutex<BackendState>,
}

struct BackendState {
    reachable: bool,
    latency: Duration,
    failing_submissions: u32,
    deployments: BTreeMap<String, WorkflowDefinition>,
    executions: HashMap<String, ExecutionRecord>,
    execution_order: Vec<String>,
    schedules: BTreeMap<String, ScheduleInfo>,
    queues: BTreeMap<String, Vec<QueuedJob>>,
}

struct ExecutionRecord {
    state: WorkflowExecutionState,
    definition: WorkflowDefinition,
    history: Vec<ExecutionEvent>,
    deadline: Option<SystemTime>,
    cancel_requested: bool,
}

impl ExecutionRecord {
    fn push_event(&mut self, kind: ExecutionEventKind, payload: Option<Value>) {
        self.history.push(ExecutionEvent {
            sequence: self.history.len() as u64 + 1,
            timestamp: SystemTime::now(),
            kind,
            payload,
        });
    }

    fn transition(&mut self, to: JobStatus, at: SystemTime) {
        let from = self.state.status;
        if from == to {
            return;
        }
        self.state.status = to;
        if to.is_terminal() {
            self.state.end_time = Some(at);
        }
        self.state.progress = Some(self.state.computed_progress());
        self.push_event(ExecutionEventKind::StatusChanged { from, to }, None);
    }
}

struct QueuedJob {
    descriptor: JobDescriptor,
    link: JobLink,
}

enum JobLink {
    Execution(String),
    Detached(JobStatus),
}

impl InMemoryAdapter {
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            default_task_queue: None,
            retention: DEFAULT_RETENTION,
            connection_timeout: None,
            operation_timeout: None,
            error_handler: Mutex::new(None),
            state: Mutex::new(BackendState {
                reachable: true,
                latency: Duration::ZERO,
                failing_submissions: 0,
                deployments: BTreeMap::new(),
                executions: HashMap::new(),
                execution_order: Vec::new(),
                schedules: BTreeMap::new(),
                queues: BTreeMap::new(),
            }),
        }
    }

    /// Recognised options: `defaultTaskQueue` (string) and `retentionMs` (integer).
    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Self> {
        let descriptor = registry::backend(config.kind).cloned().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnsupportedCapability,
                format!("no backend descriptor for '{}'", config.kind),
            )
            .with_backend(config.kind)
        })?;

        let mut adapter = Self::new(descriptor);
        adapter.default_task_queue = config.option_str("defaultTaskQueue").map(str::to_string);
        if let Some(retention_ms) = config.option_u64("retentionMs") {
            adapter.retention = Duration::from_millis(retention_ms);
        }
        adapter.connection_timeout = config.connection_timeout();
        adapter.operation_timeout = config.operation_timeout();
        Ok(adapter)
    }

    pub fn set_reachable(&self, reachable: bool) -> AdapterResult<()> {
        self.lock_state()?.reachable = reachable;
        Ok(())
    }

    /// Simulated round-trip time applied to every async operation.
    pub fn set_latency(&self, latency: Duration) -> AdapterResult<()> {
        self.lock_state()?.latency = latency;
        Ok(())
    }

    /// The next `count` submissions fail with a transient connection error.
    pub fn fail_next_submissions(&self, count: u32) -> AdapterResult<()> {
        self.lock_state()?.failing_submissions = count;
        Ok(())
    }

    /// Places a job in `queue` that was not started through `execute_workflow`.
    pub fn seed_job(
        &self,
        queue: &str,
        descriptor: JobDescriptor,
        status: JobStatus,
    ) -> AdapterResult<()> {
        let mut state = self.lock_state()?;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push(QueuedJob {
                descriptor,
                link: JobLink::Detached(status),
            });
        Ok(())
    }

    pub fn start_task(&self, execution_id: &str, task_id: &str) -> AdapterResult<()> {
        let now = SystemTime::now();
        let mut state = self.lock_state()?;
        let record = self.live_record(&mut state, execution_id, AdapterOperation::Execute)?;

        let task = record.definition.find_task(task_id).ok_or_else(|| {
            self.not_found(format!("task '{task_id}' is not part of execution '{execution_id}'"))
        })?;
        let blocked: Vec<String> = task
            .dependencies
            .iter()
            .filter(|dependency| {
                record
                    .state
                    .tasks
                    .get(dependency.as_str())
                    .map(|entry| entry.status != JobStatus::Completed)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        if !blocked.is_empty() {
            return Err(self.error(
                CoreErrorKind::Execution,
                format!(
                    "task '{task_id}' is waiting on unfinished dependencies: {}",
                    blocked.join(", ")
                ),
                AdapterOperation::Execute,
            ));
        }

        let entry = record
            .state
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(TaskExecutionState::pending);
        if entry.status != JobStatus::Pending {
            return Err(self.error(
                CoreErrorKind::Execution,
                format!("task '{task_id}' cannot start from {}", entry.status.as_str()),
                AdapterOperation::Execute,
            ));
        }
        entry.status = JobStatus::Running;
        entry.start_time = Some(now);

        record.push_event(
            ExecutionEventKind::TaskStarted {
                task_id: task_id.to_string(),
            },
            None,
        );
        record.transition(JobStatus::Running, now);
        Ok(())
    }

    pub fn complete_task(&self, execution_id: &str, task_id: &str, output: Value) -> AdapterResult<()> {
        let now = SystemTime::now();
        let mut state = self.lock_state()?;
        let record = self.live_record(&mut state, execution_id, AdapterOperation::Execute)?;

        let entry = self.running_task(record, task_id)?;
        entry.status = JobStatus::Completed;
        entry.end_time = Some(now);
        entry.output = Some(output);

        record.push_event(
            ExecutionEventKind::TaskCompleted {
                task_id: task_id.to_string(),
            },
            None,
        );
        finish_if_all_completed(record, now);
        Ok(())
    }

    /// Routes a task failure through the registered error handler, or through
    /// the task's own retry budget when no handler is installed.
    pub fn fail_task(
        &self,
        execution_id: &str,
        task_id: &str,
        message: &str,
    ) -> AdapterResult<ErrorDecision> {
        let now = SystemTime::now();
        let handler = self.current_error_handler()?;
        let mut state = self.lock_state()?;
        let record = self.live_record(&mut state, execution_id, AdapterOperation::Execute)?;

        let retries_allowed = record
            .definition
            .find_task(task_id)
            .map(|task| task.retries)
            .unwrap_or(0);
        let retry_count = self.running_task(record, task_id)?.retry_count;

        let fault = self.error(
            CoreErrorKind::Execution,
            message.to_string(),
            AdapterOperation::Execute,
        );
        let context = ErrorContext {
            scope: FaultScope::Task,
            entity_id: Some(task_id.to_string()),
            attempt_number: Some(retry_count + 1),
        };
        // Runs under the backend lock: handlers must not call back into the adapter.
        let decision = match &handler {
            Some(handler) => handler(&fault, &context),
            None if retry_count < retries_allowed => ErrorDecision::retry(Duration::ZERO),
            None => ErrorDecision::fail(),
        };

        let task_key = task_id.to_string();
        let entry = self.running_task(record, task_id)?;
        entry.error = Some(message.to_string());
        match decision.action {
            ErrorAction::Retry => {
                entry.retry_count += 1;
                entry.status = JobStatus::Pending;
                entry.start_time = None;
                let attempt = entry.retry_count + 1;
                record.push_event(
                    ExecutionEventKind::TaskRetryScheduled {
                        task_id: task_key,
                        attempt,
                        delay_ms: decision.retry_delay.unwrap_or_default().as_millis() as u64,
                    },
                    None,
                );
            }
            ErrorAction::Ignore => {
                entry.status = JobStatus::Completed;
                entry.end_time = Some(now);
                record.push_event(
                    ExecutionEventKind::TaskErrorIgnored {
                        task_id: task_key,
                        error: message.to_string(),
                    },
                    None,
                );
                finish_if_all_completed(record, now);
            }
            ErrorAction::Compensate => {
                entry.status = JobStatus::Failed;
                entry.end_time = Some(now);
                entry.compensation = decision.compensation_data.clone();
                record.push_event(
                    ExecutionEventKind::TaskCompensated { task_id: task_key },
                    decision.compensation_data.clone(),
                );
                record.state.error = Some(message.to_string());
                record.transition(JobStatus::Failed, now);
            }
            ErrorAction::Fail => {
                entry.status = JobStatus::Failed;
                entry.end_time = Some(now);
                record.push_event(
                    ExecutionEventKind::TaskFailed {
                        task_id: task_key,
                        error: message.to_string(),
                    },
                    None,
                );
                record.state.error = Some(message.to_string());
                record.transition(JobStatus::Failed, now);
            }
        }

        tracing::debug!(
            backend = ?self.descriptor.kind,
            execution_id,
            task_id,
            action = ?decision.action,
            "task fault handled"
        );
        Ok(decision)
    }

    /// Moves a cancel-requested execution to `CANCELED`. Returns `false` when
    /// no cancellation was pending.
    pub fn acknowledge_cancellation(&self, execution_id: &str) -> AdapterResult<bool> {
        let now = SystemTime::now();
        let mut state = self.lock_state()?;
        let record = self.record_mut(&mut state, execution_id, AdapterOperation::Cancel)?;
        if !record.cancel_requested || record.state.is_terminal() {
            return Ok(false);
        }
        record.transition(JobStatus::Canceled, now);
        Ok(true)
    }

    /// Times out executions whose deadline, or any running task's timeout,
    /// has passed at `now`. Returns the affected execution ids.
    pub fn enforce_timeouts_at(&self, now: SystemTime) -> AdapterResult<Vec<String>> {
        let mut state = self.lock_state()?;
        let BackendState {
            executions,
            execution_order,
            ..
        } = &mut *state;

        let mut timed_out = Vec::new();
        for execution_id in execution_order.iter() {
            let Some(record) = executions.get_mut(execution_id) else {
                continue;
            };
            if record.state.is_terminal() {
                continue;
            }

            let mut expired = record.deadline.is_some_and(|deadline| deadline <= now);
            for (task_id, entry) in record.state.tasks.iter_mut() {
                let limit = record
                    .definition
                    .find_task(task_id)
                    .and_then(|task| task.timeout);
                if let (JobStatus::Running, Some(started), Some(limit)) =
                    (entry.status, entry.start_time, limit)
                    && started.checked_add(limit).is_some_and(|deadline| deadline <= now)
                {
                    entry.status = JobStatus::Timeout;
                    entry.end_time = Some(now);
                    expired = true;
                }
            }

            if expired {
                record.state.error = Some("execution exceeded its timeout".to_string());
                record.transition(JobStatus::Timeout, now);
                timed_out.push(execution_id.clone());
            }
        }
        Ok(timed_out)
    }

    /// Drops terminal executions, and their queue entries, that ended more
    /// than the retention window before `now`.
    pub fn purge_expired_at(&self, now: SystemTime) -> AdapterResult<usize> {
        let retention = self.retention;
        let mut state = self.lock_state()?;

        let expired: Vec<String> = state
            .executions
            .iter()
            .filter(|(_, record)| {
                record.state.is_terminal()
                    && record
                        .state
                        .end_time
                        .and_then(|ended| ended.checked_add(retention))
                        .is_some_and(|expiry| expiry <= now)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for execution_id in &expired {
            state.executions.remove(execution_id);
            for jobs in state.queues.values_mut() {
                jobs.retain(|job| !matches!(&job.link, JobLink::Execution(id) if id == execution_id));
            }
        }
        state
            .execution_order
            .retain(|execution_id| !expired.contains(execution_id));
        Ok(expired.len())
    }

    pub fn pause_schedule(&self, schedule_id: &str) -> AdapterResult<()> {
        self.set_schedule_paused(schedule_id, true)
    }

    pub fn resume_schedule(&self, schedule_id: &str) -> AdapterResult<()> {
        self.set_schedule_paused(schedule_id, false)
    }

    pub fn schedule(&self, schedule_id: &str) -> AdapterResult<Option<ScheduleInfo>> {
        Ok(self.lock_state()?.schedules.get(schedule_id).cloned())
    }

    fn set_schedule_paused(&self, schedule_id: &str, paused: bool) -> AdapterResult<()> {
        let mut state = self.lock_state()?;
        let schedule = state
            .schedules
            .get_mut(schedule_id)
            .ok_or_else(|| self.not_found(format!("unknown schedule '{schedule_id}'")))?;
        schedule.paused = paused;
        Ok(())
    }

    async fn round_trip(&self, operation: AdapterOperation) -> AdapterResult<()> {
        let latency = {
            let state = self.lock_state()?;
            if !state.reachable {
                return Err(self.error(
                    CoreErrorKind::Connection,
                    "backend is unreachable",
                    operation,
                ));
            }
            state.latency
        };

        if latency.is_zero() {
            return Ok(());
        }
        match self.operation_timeout {
            Some(limit) if latency > limit => {
                tokio::time::sleep(limit).await;
                Err(self.error(
                    CoreErrorKind::Timeout,
                    format!("operation exceeded {}ms", limit.as_millis()),
                    operation,
                ))
            }
            _ => {
                tokio::time::sleep(latency).await;
                Ok(())
            }
        }
    }

    fn current_error_handler(&self) -> AdapterResult<Option<ErrorHandler>> {
        self.error_handler
            .lock()
            .map(|handler| handler.clone())
            .map_err(|_| self.poisoned())
    }

    fn record_mut<'s>(
        &self,
        state: &'s mut BackendState,
        execution_id: &str,
        operation: AdapterOperation,
    ) -> AdapterResult<&'s mut ExecutionRecord> {
        state.executions.get_mut(execution_id).ok_or_else(|| {
            self.not_found(format!("unknown execution '{execution_id}'"))
                .with_operation(operation)
        })
    }

    fn live_record<'s>(
        &self,
        state: &'s mut BackendState,
        execution_id: &str,
        operation: AdapterOperation,
    ) -> AdapterResult<&'s mut ExecutionRecord> {
        let record = self.record_mut(state, execution_id, operation)?;
        if record.state.is_terminal() {
            return Err(self.error(
                CoreErrorKind::Execution,
                format!(
                    "execution '{execution_id}' is already {}",
                    record.state.status.as_str()
                ),
                operation,
            ));
        }
        Ok(record)
    }

    fn running_task<'r>(
        &self,
        record: &'r mut ExecutionRecord,
        task_id: &str,
    ) -> AdapterResult<&'r mut TaskExecutionState> {
        let entry = record.state.tasks.get_mut(task_id).ok_or_else(|| {
            self.not_found(format!("task '{task_id}' is not part of this execution"))
        })?;
        if entry.status != JobStatus::Running {
            return Err(self.error(
                CoreErrorKind::Execution,
                format!("task '{task_id}' is {}, not running", entry.status.as_str()),
                AdapterOperation::Execute,
            ));
        }
        Ok(entry)
    }

    fn submit(
        &self,
        workflow_id: &str,
        input: Value,
        options: ExecutionOptions,
    ) -> AdapterResult<WorkflowExecutionState> {
        let now = SystemTime::now();
        let mut state = self.lock_state()?;

        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(self.error(
                CoreErrorKind::Connection,
                "transient submission failure",
                AdapterOperation::Execute,
            ));
        }

        let definition = state.deployments.get(workflow_id).cloned().ok_or_else(|| {
            self.not_found(format!("workflow '{workflow_id}' is not deployed"))
                .with_workflow(workflow_id)
                .with_operation(AdapterOperation::Execute)
        })?;

        if let Some(key) = options.idempotency_key.as_deref()
            && let Some(existing) = state.execution_order.iter().find_map(|id| {
                state.executions.get(id).filter(|record| {
                    record.state.workflow_id == workflow_id
                        && record.state.idempotency_key.as_deref() == Some(key)
                        && (record.state.status.is_live()
                            || record.state.status == JobStatus::Completed)
                })
            })
        {
            tracing::debug!(
                backend = ?self.descriptor.kind,
                workflow_id,
                execution_id = %existing.state.execution_id,
                idempotency_key = key,
                "reusing execution for idempotency key"
            );
            return Ok(existing.state.clone());
        }

        let execution_id = Uuid::new_v4().to_string();
        let task_queue = options
            .task_queue
            .clone()
            .or_else(|| self.default_task_queue.clone())
            .unwrap_or_else(|| definition.name.clone());
        let tasks = definition
            .tasks
            .iter()
            .map(|task| (task.id.clone(), TaskExecutionState::pending()))
            .collect();

        let execution = WorkflowExecutionState {
            execution_id: execution_id.clone(),
            workflow_id: workflow_id.to_string(),
            input: input.clone(),
            status: JobStatus::Pending,
            output: None,
            error: None,
            tasks,
            start_time: now,
            end_time: None,
            progress: Some(0),
            idempotency_key: options.idempotency_key.clone(),
            task_queue: Some(task_queue.clone()),
        };

        let mut job = JobDescriptor::new(
            options
                .idempotency_key
                .clone()
                .unwrap_or_else(|| execution_id.clone()),
            definition.name.clone(),
            input,
        )
        .timestamp(now);
        job.opts.priority = options.priority;

        let mut record = ExecutionRecord {
            state: execution.clone(),
            definition,
            history: Vec::new(),
            deadline: options.timeout.and_then(|timeout| now.checked_add(timeout)),
            cancel_requested: false,
        };
        record.push_event(
            ExecutionEventKind::ExecutionStarted,
            Some(json!({
                "detached": options.detached,
                "priority": options.priority,
                "taskQueue": task_queue,
                "metadata": options.metadata,
            })),
        );

        state.executions.insert(execution_id.clone(), record);
        state.execution_order.push(execution_id.clone());
        let queued = QueuedJob {
            descriptor: job,
            link: JobLink::Execution(execution_id),
        };
        let jobs = state.queues.entry(task_queue).or_default();
        match jobs
            .iter_mut()
            .find(|existing| existing.descriptor.id == queued.descriptor.id)
        {
            Some(existing) => *existing = queued,
            None => jobs.push(queued),
        }

        Ok(execution)
    }

    fn error(
        &self,
        kind: CoreErrorKind,
        message: impl Into<String>,
        operation: AdapterOperation,
    ) -> CoreError {
        CoreError::new(kind, message)
            .with_backend(self.descriptor.kind)
            .with_operation(operation)
    }

    fn not_found(&self, message: impl Into<String>) -> CoreError {
        CoreError::new(CoreErrorKind::NotFound, message).with_backend(self.descriptor.kind)
    }

    fn poisoned(&self) -> CoreError {
        CoreError::new(CoreErrorKind::Internal, "in-memory backend mutex poisoned")
            .with_backend(self.descriptor.kind)
    }

    fn lock_state(&self) -> AdapterResult<MutexGuard<'_, BackendState>> {
        self.state.lock().map_err(|_| self.poisoned())
    }
}

impl OrchestrationAdapter for InMemoryAdapter {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn convert_to_native_format(
        &self,
        definition: &WorkflowDefinition,
    ) -> AdapterResult<Converted<NativeWorkflow>> {
        Ok(to_native(self.descriptor.kind, definition))
    }

    fn convert_from_native_format(
        &self,
        native: &NativeWorkflow,
    ) -> AdapterResult<Converted<WorkflowDefinition>> {
        if native.backend != self.descriptor.kind {
            return Err(self.error(
                CoreErrorKind::Validation,
                format!(
                    "native document targets '{}', not '{}'",
                    native.backend, self.descriptor.kind
                ),
                AdapterOperation::Convert,
            ));
        }
        from_native(native)
    }

    fn deploy_workflow<'a>(&'a self, definition: WorkflowDefinition) -> AdapterFuture<'a, String> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::Deploy).await?;

            let workflow_id = definition.deployment_key();
            let validation = self.validate_workflow_definition(&definition);
            if !validation.is_valid() {
                return Err(self
                    .error(
                        CoreErrorKind::Validation,
                        validation.summary(),
                        AdapterOperation::Deploy,
                    )
                    .with_workflow(workflow_id));
            }

            let mut state = self.lock_state()?;
            if state.deployments.contains_key(&workflow_id) {
                tracing::debug!(
                    backend = ?self.descriptor.kind,
                    workflow_id = %workflow_id,
                    "workflow already deployed"
                );
                return Ok(workflow_id);
            }
            state.deployments.insert(workflow_id.clone(), definition);
            tracing::info!(
                backend = ?self.descriptor.kind,
                workflow_id = %workflow_id,
                "deployed workflow"
            );
            Ok(workflow_id)
        })
    }

    fn execute_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        input: Value,
        options: ExecutionOptions,
    ) -> AdapterFuture<'a, WorkflowExecutionState> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::Execute).await?;
            let execution = self.submit(workflow_id, input, options)?;
            tracing::info!(
                backend = ?self.descriptor.kind,
                workflow_id,
                execution_id = %execution.execution_id,
                "execution accepted"
            );
            Ok(execution)
        })
    }

    fn get_execution_state<'a>(
        &'a self,
        execution_id: &'a str,
    ) -> AdapterFuture<'a, WorkflowExecutionState> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::QueryState).await?;
            let mut state = self.lock_state()?;
            let record = self.record_mut(&mut state, execution_id, AdapterOperation::QueryState)?;
            Ok(record.state.clone())
        })
    }

    fn cancel_execution<'a>(
        &'a self,
        execution_id: &'a str,
        reason: Option<String>,
    ) -> AdapterFuture<'a, bool> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::Cancel).await?;
            let mut state = self.lock_state()?;
            let record = self.record_mut(&mut state, execution_id, AdapterOperation::Cancel)?;
            if record.state.is_terminal() {
                return Ok(false);
            }
            record.cancel_requested = true;
            record.push_event(ExecutionEventKind::CancellationRequested { reason }, None);
            tracing::info!(
                backend = ?self.descriptor.kind,
                execution_id,
                "cancellation requested"
            );
            Ok(true)
        })
    }

    fn terminate_execution<'a>(
        &'a self,
        execution_id: &'a str,
        reason: Option<String>,
    ) -> AdapterFuture<'a, bool> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::Terminate).await?;
            let now = SystemTime::now();
            let mut state = self.lock_state()?;
            let record = self.record_mut(&mut state, execution_id, AdapterOperation::Terminate)?;
            if record.state.is_terminal() {
                return Ok(false);
            }
            record.state.error = reason;
            record.transition(JobStatus::Terminated, now);
            Ok(true)
        })
    }

    fn get_execution_history<'a>(
        &'a self,
        execution_id: &'a str,
    ) -> AdapterFuture<'a, Vec<ExecutionEvent>> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::History).await?;
            let mut state = self.lock_state()?;
            let record = self.record_mut(&mut state, execution_id, AdapterOperation::History)?;
            Ok(record.history.clone())
        })
    }

    fn schedule_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        cron_expression: &'a str,
        input: Option<Value>,
    ) -> AdapterFuture<'a, String> {
        Box::pin(async move {
            ensure_capability_supported(
                &self.descriptor,
                Capability::Scheduling,
                AdapterOperation::Schedule,
            )?;
            let fields = cron_expression.split_whitespace().count();
            if !(5..=6).contains(&fields) {
                return Err(self.error(
                    CoreErrorKind::Validation,
                    format!("'{cron_expression}' is not a 5 or 6 field cron expression"),
                    AdapterOperation::Schedule,
                ));
            }
            self.round_trip(AdapterOperation::Schedule).await?;

            let mut state = self.lock_state()?;
            if !state.deployments.contains_key(workflow_id) {
                return Err(self
                    .not_found(format!("workflow '{workflow_id}' is not deployed"))
                    .with_workflow(workflow_id)
                    .with_operation(AdapterOperation::Schedule));
            }
            let schedule_id = format!("schedule-{}", Uuid::new_v4());
            state.schedules.insert(
                schedule_id.clone(),
                ScheduleInfo {
                    schedule_id: schedule_id.clone(),
                    workflow_id: workflow_id.to_string(),
                    cron_expression: cron_expression.to_string(),
                    input,
                    paused: false,
                },
            );
            Ok(schedule_id)
        })
    }

    fn signal_workflow<'a>(
        &'a self,
        execution_id: &'a str,
        signal_name: &'a str,
        payload: Option<Value>,
    ) -> AdapterFuture<'a, bool> {
        Box::pin(async move {
            if !self.descriptor.supports(Capability::Signaling) {
                return Ok(false);
            }
            self.round_trip(AdapterOperation::Signal).await?;
            let mut state = self.lock_state()?;
            let record = self.record_mut(&mut state, execution_id, AdapterOperation::Signal)?;
            if record.state.is_terminal() {
                return Ok(false);
            }
            record.push_event(
                ExecutionEventKind::SignalReceived {
                    signal: signal_name.to_string(),
                },
                payload,
            );
            Ok(true)
        })
    }

    fn list_workflows<'a>(
        &'a self,
        query: WorkflowQuery,
    ) -> AdapterFuture<'a, Page<WorkflowSummary>> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::ListWorkflows).await?;
            let state = self.lock_state()?;
            let matching: Vec<WorkflowSummary> = state
                .deployments
                .iter()
                .filter(|(_, definition)| {
                    query
                        .name
                        .as_deref()
                        .is_none_or(|name| definition.name == name)
                        && query
                            .version
                            .as_deref()
                            .is_none_or(|version| definition.version == version)
                })
                .map(|(workflow_id, definition)| WorkflowSummary {
                    workflow_id: workflow_id.clone(),
                    name: definition.name.clone(),
                    version: definition.version.clone(),
                    task_count: definition.tasks.len(),
                })
                .collect();
            Ok(Page::slice(matching, query.offset, query.limit))
        })
    }

    fn list_executions<'a>(
        &'a self,
        query: ExecutionQuery,
    ) -> AdapterFuture<'a, Page<WorkflowExecutionState>> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::ListExecutions).await?;
            let state = self.lock_state()?;
            let matching: Vec<WorkflowExecutionState> = state
                .execution_order
                .iter()
                .filter_map(|id| state.executions.get(id))
                .map(|record| &record.state)
                .filter(|execution| {
                    query
                        .workflow_id
                        .as_deref()
                        .is_none_or(|id| execution.workflow_id == id)
                        && query.status.is_none_or(|status| execution.status == status)
                        && query
                            .idempotency_key
                            .as_deref()
                            .is_none_or(|key| execution.idempotency_key.as_deref() == Some(key))
                        && query
                            .task_queue
                            .as_deref()
                            .is_none_or(|queue| execution.task_queue.as_deref() == Some(queue))
                })
                .cloned()
                .collect();
            Ok(Page::slice(matching, query.offset, query.limit))
        })
    }

    fn register_error_handler(&self, handler: ErrorHandler) {
        match self.error_handler.lock() {
            Ok(mut slot) => *slot = Some(handler),
            Err(_) => tracing::error!(
                backend = ?self.descriptor.kind,
                "failed to register error handler: mutex poisoned"
            ),
        }
    }

    fn check_health<'a>(&'a self) -> HealthFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            if let Err(error) = self.round_trip(AdapterOperation::HealthCheck).await {
                return HealthReport::unhealthy(error.message);
            }
            let elapsed = started.elapsed();
            let mut report = HealthReport::healthy(elapsed.as_millis() as u64);
            if self
                .connection_timeout
                .is_some_and(|threshold| elapsed > threshold)
            {
                report.status = HealthStatus::Degraded;
            }
            report
        })
    }
}

impl JobSource for InMemoryAdapter {
    fn list_jobs<'a>(&'a self, queue: &'a str) -> AdapterFuture<'a, Vec<JobDescriptor>> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::ListJobs).await?;
            let state = self.lock_state()?;
            Ok(state
                .queues
                .get(queue)
                .map(|jobs| jobs.iter().map(|job| job.descriptor.clone()).collect())
                .unwrap_or_default())
        })
    }

    fn job_status<'a>(&'a self, queue: &'a str, job_id: &'a str) -> AdapterFuture<'a, JobStatus> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::ListJobs).await?;
            let state = self.lock_state()?;
            let job = state
                .queues
                .get(queue)
                .and_then(|jobs| jobs.iter().find(|job| job.descriptor.id == job_id))
                .ok_or_else(|| {
                    self.not_found(format!("job '{job_id}' is not in queue '{queue}'"))
                        .with_operation(AdapterOperation::ListJobs)
                })?;
            Ok(match &job.link {
                JobLink::Detached(status) => *status,
                JobLink::Execution(execution_id) => state
                    .executions
                    .get(execution_id)
                    .map(|record| record.state.status)
                    .unwrap_or(JobStatus::Unknown),
            })
        })
    }

    fn remove_job<'a>(&'a self, queue: &'a str, job_id: &'a str) -> AdapterFuture<'a, bool> {
        Box::pin(async move {
            self.round_trip(AdapterOperation::RemoveJob).await?;
            let mut state = self.lock_state()?;
            let Some(jobs) = state.queues.get_mut(queue) else {
                return Ok(false);
            };
            let before = jobs.len();
            jobs.retain(|job| job.descriptor.id != job_id);
            Ok(jobs.len() != before)
        })
    }
}

fn finish_if_all_completed(record: &mut ExecutionRecord, now: SystemTime) {
    let all_completed = record
        .state
        .tasks
        .values()
        .all(|task| task.status == JobStatus::Completed);
    if !all_completed {
        record.state.progress = Some(record.state.computed_progress());
        return;
    }

    let output_task = record
        .definition
        .output_task
        .clone()
        .or_else(|| record.definition.tasks.last().map(|task| task.id.clone()));
    record.state.output = output_task
        .and_then(|task_id| record.state.tasks.get(&task_id))
        .and_then(|task| task.output.clone());
    record.transition(JobStatus::Completed, now);
}
