pub mod retry;
pub mod status;

pub use retry::{Backoff, RetryPolicy, with_retry};
pub use status::{
    MonitorEvent, MonitorStatus, StatusMonitor, StatusObserver, SubscriptionToken,
    WorkflowStatusEntry,
};
