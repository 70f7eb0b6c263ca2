/// One forward/backward schema change for the version registry database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

static MIGRATIONS: &[SqliteMigration] = &[
    SqliteMigration {
        version: 1,
        name: "initial_version_registry",
        up_sql: "
CREATE TABLE IF NOT EXISTS workflow_versions (
    workflow_name TEXT NOT NULL,
    version TEXT NOT NULL,
    build_id TEXT NOT NULL,
    task_queue TEXT NOT NULL,
    compatible_json TEXT NOT NULL DEFAULT '[]',
    created_at_unix_ms INTEGER NOT NULL,
    PRIMARY KEY (workflow_name, version)
);",
        down_sql: "DROP TABLE IF EXISTS workflow_versions;",
    },
    SqliteMigration {
        version: 2,
        name: "add_version_metadata_and_queue_index",
        up_sql: "
ALTER TABLE workflow_versions ADD COLUMN metadata_json TEXT NOT NULL DEFAULT '{}';
CREATE INDEX IF NOT EXISTS idx_workflow_versions_task_queue ON workflow_versions (task_queue);",
        down_sql: "
DROP INDEX IF EXISTS idx_workflow_versions_task_queue;
ALTER TABLE workflow_versions DROP COLUMN metadata_json;",
    },
];

/// All migrations, oldest first.
pub fn migrations() -> &'static [SqliteMigration] {
    MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map_or(0, |entry| entry.version)
}
