pub mod coordinator;
pub mod report;

pub use coordinator::{MigrationConfig, MigrationCoordinator, migration_key};
pub use report::{JobMigrationRecord, MigrationOutcome, MigrationReport, MigrationSummary, SkipReason};
