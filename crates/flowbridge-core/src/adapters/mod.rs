pub mod contract;
pub mod factory;
pub mod in_memory;
pub mod native;

pub use contract::{
    AdapterFuture, AdapterResult, Converted, HealthFuture, JobSource, NativeWorkflow,
    OrchestrationAdapter, ensure_capability_supported, validate_for_backend,
};
pub use factory::{AdapterConstructor, AdapterFactory, AdapterHandle};
pub use in_memory::{InMemoryAdapter, ScheduleInfo};
