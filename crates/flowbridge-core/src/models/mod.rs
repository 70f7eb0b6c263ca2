pub mod backend;
pub mod error;
pub mod execution;
pub mod fault;
pub mod health;
pub mod job;
pub mod query;
pub(crate) mod serde_time;
pub mod validation;
pub mod version;
pub mod workflow;

pub use backend::{
    AdapterOperation, BackendDescriptor, BackendKind, BackendLimits, Capability,
    CapabilityProfile, OrchestratorCapabilities,
};
pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use execution::{
    ExecutionEvent, ExecutionEventKind, ExecutionOptions, JobStatus, TaskExecutionState,
    WorkflowExecutionState,
};
pub use fault::{ErrorAction, ErrorContext, ErrorDecision, ErrorHandler, FaultScope};
pub use health::{ConnectionState, HealthDetails, HealthReport, HealthStatus};
pub use job::{JobDescriptor, JobOptions};
pub use query::{ExecutionQuery, Page, WorkflowQuery, WorkflowSummary};
pub use validation::{ValidationCode, ValidationError, ValidationResult, ValidationWarning};
pub use version::{VersionSelector, WorkflowVersion};
pub use workflow::{WorkflowDefinition, WorkflowTask};
