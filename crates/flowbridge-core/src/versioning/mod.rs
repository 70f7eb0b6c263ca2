pub mod launch;
pub mod registry;

pub use launch::start_versioned_workflow;
pub use registry::{VersionRegistration, VersionRegistry};
