use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::models::{CoreError, CoreErrorKind, CoreResult, JobStatus, WorkflowExecutionState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Started,
    Running,
    Completed,
    Failed,
}

impl MonitorStatus {
    pub const ALL: [MonitorStatus; 4] = [
        MonitorStatus::Started,
        MonitorStatus::Running,
        MonitorStatus::Completed,
        MonitorStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Pending runs count as started; every terminal outcome other than
    /// success counts as failed.
    pub fn from_job_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => Self::Started,
            JobStatus::Running | JobStatus::Waiting | JobStatus::Unknown => Self::Running,
            JobStatus::Completed => Self::Completed,
            JobStatus::Failed | JobStatus::Canceled | JobStatus::Timeout | JobStatus::Terminated => {
                Self::Failed
            }
        }
    }
}

impl std::str::FromStr for MonitorStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusEntry {
    pub workflow_id: String,
    pub status: MonitorStatus,
    #[serde(with = "crate::models::serde_time::unix_millis")]
    pub start_time: SystemTime,
    #[serde(with = "crate::models::serde_time::unix_millis")]
    pub last_updated: SystemTime,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl WorkflowStatusEntry {
    pub fn duration(&self) -> Duration {
        self.last_updated
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    StatusChange(WorkflowStatusEntry),
    Completed {
        entry: WorkflowStatusEntry,
        duration: Duration,
    },
    Failed {
        entry: WorkflowStatusEntry,
        duration: Duration,
    },
}

impl MonitorEvent {
    pub fn workflow_id(&self) -> &str {
        match self {
            Self::StatusChange(entry)
            | Self::Completed { entry, .. }
            | Self::Failed { entry, .. } => &entry.workflow_id,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionToken(pub u64);

pub type StatusObserver = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

/// Shared table of workflow run states.
///
/// Every event is delivered to registered observers, invoked after the
/// table lock is released, and to the broadcast channel behind `events()`.
pub struct StatusMonitor {
    entries: Mutex<BTreeMap<String, WorkflowStatusEntry>>,
    observers: Mutex<Vec<(SubscriptionToken, StatusObserver)>>,
    next_token: AtomicU64,
    cleaning: AtomicBool,
    events: broadcast::Sender<MonitorEvent>,
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMonitor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            cleaning: AtomicBool::new(false),
            events,
        }
    }

    pub fn report_status(
        &self,
        workflow_id: &str,
        status: MonitorStatus,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> CoreResult<WorkflowStatusEntry> {
        self.record_at(workflow_id, status, metadata, SystemTime::now())
    }

    /// Upserts the entry at an explicit time. Metadata is merged into what is
    /// already recorded.
    pub fn record_at(
        &self,
        workflow_id: &str,
        status: MonitorStatus,
        metadata: Option<BTreeMap<String, Value>>,
        at: SystemTime,
    ) -> CoreResult<WorkflowStatusEntry> {
        let entry = {
            let mut entries = self.lock_entries()?;
            let entry = entries
                .entry(workflow_id.to_string())
                .or_insert_with(|| WorkflowStatusEntry {
                    workflow_id: workflow_id.to_string(),
                    status,
                    start_time: at,
                    last_updated: at,
                    metadata: BTreeMap::new(),
                });
            entry.status = status;
            entry.last_updated = at;
            entry.metadata.extend(metadata.unwrap_or_default());
            entry.clone()
        };

        tracing::debug!(workflow_id, status = status.as_str(), "workflow status reported");

        let mut events = vec![MonitorEvent::StatusChange(entry.clone())];
        let duration = entry.duration();
        match status {
            MonitorStatus::Completed => events.push(MonitorEvent::Completed {
                entry: entry.clone(),
                duration,
            }),
            MonitorStatus::Failed => events.push(MonitorEvent::Failed {
                entry: entry.clone(),
                duration,
            }),
            MonitorStatus::Started | MonitorStatus::Running => {}
        }
        self.publish(&events)?;
        Ok(entry)
    }

    /// Relays an adapter-reported execution state, keyed by execution id.
    pub fn relay_execution(
        &self,
        execution: &WorkflowExecutionState,
    ) -> CoreResult<WorkflowStatusEntry> {
        let mut metadata = BTreeMap::new();
        metadata.insert("workflowId".to_string(), json!(execution.workflow_id));
        metadata.insert("jobStatus".to_string(), json!(execution.status.as_str()));
        metadata.insert(
            "progress".to_string(),
            json!(execution.progress.unwrap_or_else(|| execution.computed_progress())),
        );
        if let Some(error) = &execution.error {
            metadata.insert("error".to_string(), json!(error));
        }
        self.report_status(
            &execution.execution_id,
            MonitorStatus::from_job_status(execution.status),
            Some(metadata),
        )
    }

    pub fn get_workflow_status(&self, workflow_id: &str) -> CoreResult<Option<WorkflowStatusEntry>> {
        Ok(self.lock_entries()?.get(workflow_id).cloned())
    }

    pub fn get_all_workflows(&self) -> CoreResult<Vec<WorkflowStatusEntry>> {
        Ok(self.lock_entries()?.values().cloned().collect())
    }

    pub fn cleanup_old_workflows(&self, max_age: Duration) -> CoreResult<usize> {
        self.cleanup_old_workflows_at(max_age, SystemTime::now())
    }

    /// Evicts completed and failed entries last updated more than `max_age`
    /// before `now`. Returns 0 without touching the table when another
    /// cleanup is already in progress.
    pub fn cleanup_old_workflows_at(&self, max_age: Duration, now: SystemTime) -> CoreResult<usize> {
        if self.cleaning.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }

        let result = self.lock_entries().map(|mut entries| {
            let before = entries.len();
            entries.retain(|_, entry| {
                let age = now.duration_since(entry.last_updated).unwrap_or_default();
                !(entry.status.is_terminal() && age > max_age)
            });
            before - entries.len()
        });

        self.cleaning.store(false, Ordering::Release);
        if let Ok(removed) = result
            && removed > 0
        {
            tracing::info!(removed, "evicted finished workflow status entries");
        }
        result
    }

    pub fn subscribe(&self, observer: StatusObserver) -> CoreResult<SubscriptionToken> {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock_observers()?.push((token, observer));
        Ok(token)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> CoreResult<bool> {
        let mut observers = self.lock_observers()?;
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != token);
        Ok(observers.len() != before)
    }

    pub fn clear_observers(&self) -> CoreResult<()> {
        self.lock_observers()?.clear();
        Ok(())
    }

    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn publish(&self, events: &[MonitorEvent]) -> CoreResult<()> {
        let observers: Vec<StatusObserver> = self
            .lock_observers()?
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for event in events {
            for observer in &observers {
                observer(event);
            }
            // No receivers is not an error.
            let _ = self.events.send(event.clone());
        }
        Ok(())
    }

    fn lock_entries(&self) -> CoreResult<MutexGuard<'_, BTreeMap<String, WorkflowStatusEntry>>> {
        self.entries.lock().map_err(|_| poisoned("status table"))
    }

    fn lock_observers(&self) -> CoreResult<MutexGuard<'_, Vec<(SubscriptionToken, StatusObserver)>>> {
        self.observers.lock().map_err(|_| poisoned("observer list"))
    }
}

fn poisoned(what: &str) -> CoreError {
    CoreError::new(
        CoreErrorKind::Internal,
        format!("status monitor {what} mutex poisoned"),
    )
}
