use crate::models::{
    BackendDescriptor, BackendKind, BackendLimits, CapabilityProfile, OrchestratorCapabilities,
};

const DURABLE_WORKFLOW_CAPABILITIES: OrchestratorCapabilities = OrchestratorCapabilities {
    durable_workflows: true,
    workflow_recovery: true,
    parallel_execution: true,
    sub_workflows: true,
    signaling: true,
    distributed_transactions: true,
    scheduling: true,
    versioning: true,
    limits: BackendLimits {
        max_tasks: None,
        transform_hooks: true,
        error_hooks: true,
    },
    profile: CapabilityProfile::DurableWorkflow {
        child_workflows: true,
        continue_as_new: true,
        local_activities: true,
    },
};

const JOB_QUEUE_CAPABILITIES: OrchestratorCapabilities = OrchestratorCapabilities {
    durable_workflows: false,
    workflow_recovery: true,
    parallel_execution: true,
    sub_workflows: false,
    signaling: false,
    distributed_transactions: false,
    scheduling: true,
    versioning: false,
    limits: BackendLimits {
        max_tasks: Some(500),
        transform_hooks: false,
        error_hooks: true,
    },
    profile: CapabilityProfile::JobQueue {
        delayed_jobs: true,
        job_priorities: true,
        rate_limiting: true,
    },
};

const VISUAL_AUTOMATION_CAPABILITIES: OrchestratorCapabilities = OrchestratorCapabilities {
    durable_workflows: false,
    workflow_recovery: false,
    parallel_execution: true,
    sub_workflows: true,
    signaling: false,
    distributed_transactions: false,
    scheduling: true,
    versioning: false,
    limits: BackendLimits {
        max_tasks: Some(100),
        transform_hooks: true,
        error_hooks: false,
    },
    profile: CapabilityProfile::VisualAutomation {
        webhook_triggers: true,
        credential_vault: true,
    },
};

const ALL_BACKENDS: [BackendDescriptor; 3] = [
    BackendDescriptor {
        kind: BackendKind::DurableWorkflow,
        display_name: "Durable workflow engine",
        capabilities: DURABLE_WORKFLOW_CAPABILITIES,
    },
    BackendDescriptor {
        kind: BackendKind::JobQueue,
        display_name: "Queue-backed job runner",
        capabilities: JOB_QUEUE_CAPABILITIES,
    },
    BackendDescriptor {
        kind: BackendKind::VisualAutomation,
        display_name: "Visual automation engine",
        capabilities: VISUAL_AUTOMATION_CAPABILITIES,
    },
];

pub fn backends() -> &'static [BackendDescriptor] {
    &ALL_BACKENDS
}

pub fn backend(kind: BackendKind) -> Option<&'static BackendDescriptor> {
    ALL_BACKENDS.iter().find(|descriptor| descriptor.kind == kind)
}
