use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    DurableWorkflow,
    JobQueue,
    VisualAutomation,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::DurableWorkflow,
        BackendKind::JobQueue,
        BackendKind::VisualAutomation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DurableWorkflow => "durable_workflow",
            Self::JobQueue => "job_queue",
            Self::VisualAutomation => "visual_automation",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "durable_workflow" => Ok(Self::DurableWorkflow),
            "job_queue" => Ok(Self::JobQueue),
            "visual_automation" => Ok(Self::VisualAutomation),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterOperation {
    Validate,
    Convert,
    Deploy,
    Execute,
    QueryState,
    Cancel,
    Terminate,
    History,
    Schedule,
    Signal,
    ListWorkflows,
    ListExecutions,
    ListJobs,
    RemoveJob,
    HealthCheck,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    DurableWorkflows,
    WorkflowRecovery,
    ParallelExecution,
    SubWorkflows,
    Signaling,
    DistributedTransactions,
    Scheduling,
    Versioning,
}

/// Flags that only make sense for one backend family.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CapabilityProfile {
    DurableWorkflow {
        child_workflows: bool,
        continue_as_new: bool,
        local_activities: bool,
    },
    JobQueue {
        delayed_jobs: bool,
        job_priorities: bool,
        rate_limiting: bool,
    },
    VisualAutomation {
        webhook_triggers: bool,
        credential_vault: bool,
    },
}

impl CapabilityProfile {
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::DurableWorkflow { .. } => BackendKind::DurableWorkflow,
            Self::JobQueue { .. } => BackendKind::JobQueue,
            Self::VisualAutomation { .. } => BackendKind::VisualAutomation,
        }
    }

    pub fn honours_task_priority(&self) -> bool {
        match self {
            Self::DurableWorkflow { .. } => true,
            Self::JobQueue { job_priorities, .. } => *job_priorities,
            Self::VisualAutomation { .. } => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BackendLimits {
    pub max_tasks: Option<usize>,
    pub transform_hooks: bool,
    pub error_hooks: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorCapabilities {
    pub durable_workflows: bool,
    pub workflow_recovery: bool,
    pub parallel_execution: bool,
    pub sub_workflows: bool,
    pub signaling: bool,
    pub distributed_transactions: bool,
    pub scheduling: bool,
    pub versioning: bool,
    pub limits: BackendLimits,
    pub profile: CapabilityProfile,
}

impl OrchestratorCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::DurableWorkflows => self.durable_workflows,
            Capability::WorkflowRecovery => self.workflow_recovery,
            Capability::ParallelExecution => self.parallel_execution,
            Capability::SubWorkflows => self.sub_workflows,
            Capability::Signaling => self.signaling,
            Capability::DistributedTransactions => self.distributed_transactions,
            Capability::Scheduling => self.scheduling,
            Capability::Versioning => self.versioning,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub display_name: &'static str,
    pub capabilities: OrchestratorCapabilities,
}

impl BackendDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }
}
