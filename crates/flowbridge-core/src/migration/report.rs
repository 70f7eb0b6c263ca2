use crate::models::{CoreError, JobStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// The job already reached a terminal state on the source.
    SourceTerminal(JobStatus),
    /// The target already holds a live or completed execution for this job.
    AlreadyMigrated { execution_id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum MigrationOutcome {
    Migrated { execution_id: String },
    WouldMigrate,
    Skipped(SkipReason),
    Failed(CoreError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobMigrationRecord {
    pub job_id: String,
    pub job_name: String,
    pub source_status: Option<JobStatus>,
    pub outcome: MigrationOutcome,
    pub source_removed: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MigrationSummary {
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub would_migrate_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MigrationReport {
    pub queue: String,
    pub dry_run: bool,
    pub jobs_found: usize,
    /// One record per source job, in source order.
    pub records: Vec<JobMigrationRecord>,
    pub summary: MigrationSummary,
}

impl MigrationReport {
    pub fn new(queue: String, dry_run: bool, records: Vec<JobMigrationRecord>) -> Self {
        let mut summary = MigrationSummary::default();
        for record in &records {
            match record.outcome {
                MigrationOutcome::Migrated { .. } => summary.migrated_count += 1,
                MigrationOutcome::WouldMigrate => summary.would_migrate_count += 1,
                MigrationOutcome::Skipped(_) => summary.skipped_count += 1,
                MigrationOutcome::Failed(_) => summary.failed_count += 1,
            }
        }
        Self {
            queue,
            dry_run,
            jobs_found: records.len(),
            records,
            summary,
        }
    }

    /// Jobs that need manual remediation.
    pub fn failed_job_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, MigrationOutcome::Failed(_)))
            .map(|record| record.job_id.clone())
            .collect()
    }

    pub fn record(&self, job_id: &str) -> Option<&JobMigrationRecord> {
        self.records.iter().find(|record| record.job_id == job_id)
    }
}
