use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::models::serde_time::unix_millis;
use crate::models::{CoreError, CoreErrorKind, WorkflowVersion};
use crate::persistence::{MigrationStore, PersistenceResult, VersionDocument, VersionStore};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const HISTORY_TABLE: &str = "registry_schema_history";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Step {
    Up,
    Down,
}

/// SQLite-backed version store. Every call opens its own connection, so the
/// store is cheap to share and never holds the database open between calls.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn database_path(&self) -> &Path {
        &self.path
    }

    /// Migrations still pending for a database at `from_version`.
    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        schema_path(from_version, current_schema_version())
            .into_iter()
            .filter(|(_, step)| *step == Step::Up)
            .map(|(entry, _)| entry)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn open(&self, operation: &str) -> PersistenceResult<Connection> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|error| {
                store_failure(operation, format!("cannot create '{}': {error}", dir.display()))
            })?;
        }
        let connection = Connection::open(&self.path).in_op(operation)?;
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {HISTORY_TABLE} (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at_unix_ms INTEGER NOT NULL
                );"
            ))
            .in_op(operation)?;
        Ok(connection)
    }

    /// Opens a connection and refuses to continue unless the schema is current.
    fn open_current(&self, operation: &str) -> PersistenceResult<Connection> {
        let connection = self.open(operation)?;
        let version = schema_version(&connection).in_op(operation)?;
        if version < current_schema_version() {
            return Err(store_failure(
                operation,
                format!(
                    "schema is at version {version}, expected {}; run migrations first",
                    current_schema_version()
                ),
            ));
        }
        Ok(connection)
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        let connection = self.open("current_version")?;
        schema_version(&connection).in_op("current_version")
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        let known = target_version == 0 || migration(target_version).is_some();
        if !known || target_version > current_schema_version() {
            return Err(store_failure(
                "apply_migration",
                format!("no schema version {target_version}"),
            ));
        }

        let mut connection = self.open("apply_migration")?;
        let from = schema_version(&connection).in_op("apply_migration")?;
        for (entry, step) in schema_path(from, target_version) {
            run_step(&mut connection, entry, step).in_op("apply_migration")?;
            tracing::info!(
                version = entry.version,
                name = entry.name,
                step = ?step,
                "sqlite schema step applied"
            );
        }
        Ok(())
    }
}

/// Raw column values of one `workflow_versions` row, decoded outside the
/// rusqlite row callback so JSON errors surface as store failures.
struct VersionRow {
    workflow_name: String,
    version: String,
    build_id: String,
    task_queue: String,
    compatible_json: String,
    metadata_json: String,
    created_at_ms: i64,
}

impl VersionRow {
    fn decode(self) -> PersistenceResult<WorkflowVersion> {
        let created_at_ms = u64::try_from(self.created_at_ms).map_err(|_| {
            store_failure(
                "load_versions",
                format!(
                    "{}@{} has a negative creation time",
                    self.workflow_name, self.version
                ),
            )
        })?;
        Ok(WorkflowVersion {
            compatible: json_column(&self.compatible_json, "compatible_json")?,
            metadata: json_column(&self.metadata_json, "metadata_json")?,
            created_at: unix_millis::from_millis(created_at_ms),
            workflow_name: self.workflow_name,
            version: self.version,
            build_id: self.build_id,
            task_queue: self.task_queue,
        })
    }
}

impl VersionStore for SqliteStore {
    fn load(&self) -> PersistenceResult<VersionDocument> {
        let connection = self.open_current("load_versions")?;
        let mut statement = connection
            .prepare(
                "SELECT workflow_name, version, build_id, task_queue,
                        compatible_json, metadata_json, created_at_unix_ms
                 FROM workflow_versions
                 ORDER BY workflow_name, created_at_unix_ms",
            )
            .in_op("load_versions")?;
        let rows = statement
            .query_map([], |row| {
                Ok(VersionRow {
                    workflow_name: row.get("workflow_name")?,
                    version: row.get("version")?,
                    build_id: row.get("build_id")?,
                    task_queue: row.get("task_queue")?,
                    compatible_json: row.get("compatible_json")?,
                    metadata_json: row.get("metadata_json")?,
                    created_at_ms: row.get("created_at_unix_ms")?,
                })
            })
            .in_op("load_versions")?;

        let mut document = VersionDocument::new();
        for row in rows {
            let version = row.in_op("load_versions")?.decode()?;
            document
                .entry(version.workflow_name.clone())
                .or_default()
                .push(version);
        }
        Ok(document)
    }

    fn save(&self, document: &VersionDocument) -> PersistenceResult<()> {
        let mut connection = self.open_current("save_versions")?;
        let transaction = connection.transaction().in_op("save_versions")?;
        replace_versions(&transaction, document)?;
        transaction.commit().in_op("save_versions")
    }
}

fn replace_versions(transaction: &Transaction<'_>, document: &VersionDocument) -> PersistenceResult<()> {
    transaction
        .execute("DELETE FROM workflow_versions", [])
        .in_op("save_versions")?;
    let mut insert = transaction
        .prepare(
            "INSERT INTO workflow_versions (
                workflow_name, version, build_id, task_queue,
                compatible_json, metadata_json, created_at_unix_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .in_op("save_versions")?;

    for entry in document.values().flatten() {
        let created_at_ms = millis_i64(entry.created_at).ok_or_else(|| {
            store_failure(
                "save_versions",
                format!("{}@{} has an unrepresentable creation time", entry.workflow_name, entry.version),
            )
        })?;
        insert
            .execute(params![
                entry.workflow_name,
                entry.version,
                entry.build_id,
                entry.task_queue,
                to_json(&entry.compatible)?,
                to_json(&entry.metadata)?,
                created_at_ms,
            ])
            .in_op("save_versions")?;
    }
    Ok(())
}

/// Ordered steps taking a database from `from` to `to`. Downgrades undo the
/// newest migration first.
fn schema_path(from: i64, to: i64) -> Vec<(&'static SqliteMigration, Step)> {
    if to >= from {
        migrations()
            .iter()
            .filter(|entry| entry.version > from && entry.version <= to)
            .map(|entry| (entry, Step::Up))
            .collect()
    } else {
        migrations()
            .iter()
            .rev()
            .filter(|entry| entry.version > to && entry.version <= from)
            .map(|entry| (entry, Step::Down))
            .collect()
    }
}

fn schema_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection
        .query_row(
            &format!("SELECT MAX(version) FROM {HISTORY_TABLE}"),
            [],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()
        .map(|version| version.flatten().unwrap_or(0))
}

fn run_step(connection: &mut Connection, entry: &SqliteMigration, step: Step) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    match step {
        Step::Up => {
            run_sql_allowing_existing_columns(&transaction, entry.up_sql)?;
            transaction.execute(
                &format!(
                    "INSERT INTO {HISTORY_TABLE} (version, name, applied_at_unix_ms) VALUES (?1, ?2, ?3)"
                ),
                params![entry.version, entry.name, millis_i64(SystemTime::now()).unwrap_or(0)],
            )?;
        }
        Step::Down => {
            transaction.execute_batch(entry.down_sql)?;
            transaction.execute(
                &format!("DELETE FROM {HISTORY_TABLE} WHERE version = ?1"),
                [entry.version],
            )?;
        }
    }
    transaction.commit()
}

/// A re-run `ADD COLUMN` fails in SQLite; an already present column is fine.
fn run_sql_allowing_existing_columns(transaction: &Transaction<'_>, sql: &str) -> rusqlite::Result<()> {
    match transaction.execute_batch(sql) {
        Err(error) if error.to_string().contains("duplicate column name") => Ok(()),
        other => other,
    }
}

fn millis_i64(value: SystemTime) -> Option<i64> {
    i64::try_from(unix_millis::to_millis(value)).ok()
}

fn json_column<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> PersistenceResult<T> {
    serde_json::from_str(raw)
        .map_err(|error| store_failure("load_versions", format!("column {column}: {error}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> PersistenceResult<String> {
    serde_json::to_string(value).map_err(|error| store_failure("save_versions", error.to_string()))
}

trait SqlContext<T> {
    fn in_op(self, operation: &str) -> PersistenceResult<T>;
}

impl<T> SqlContext<T> for rusqlite::Result<T> {
    fn in_op(self, operation: &str) -> PersistenceResult<T> {
        self.map_err(|error| store_failure(operation, error.to_string()))
    }
}

fn store_failure(operation: &str, detail: impl Into<String>) -> CoreError {
    let error = CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite {operation}: {}", detail.into()),
    );
    tracing::error!(operation, message = %error.message, "sqlite store failure");
    error
}
