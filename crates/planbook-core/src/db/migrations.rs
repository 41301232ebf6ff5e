//! Database migrations
//!
//! The schema history is a declarative, strictly ordered list of
//! [`Migration`] descriptors. One runner applies every descriptor newer than
//! the persisted version, each inside its own exclusive transaction.

use libsql::Connection;

use super::connection::finish;
use super::rows::{opt_int, opt_text};
use crate::error::{Error, Result};

/// Current schema version
pub const CURRENT_VERSION: u32 = 5;

/// Shape change applied by a migration.
#[derive(Debug, Clone, Copy)]
pub enum MigrationStep {
    /// Idempotent DDL/DML statement (`IF NOT EXISTS`, `OR IGNORE`, ...)
    Sql(&'static str),
    /// `ALTER TABLE .. ADD COLUMN`, skipped when the column already exists
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

/// Data transform over rows persisted before the migration.
///
/// Backfills only touch rows where the new field is still NULL.
#[derive(Debug, Clone, Copy)]
pub enum Backfill {
    /// Seed `_version = 1` and the local device id on legacy rows
    DefaultVersion { tables: &'static [&'static str] },
    /// Assign dense `sort_order` values, newest `created_at` first
    AssignOrder { tables: &'static [&'static str] },
}

/// One schema version.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub steps: &'static [MigrationStep],
    pub backfill: Option<Backfill>,
}

macro_rules! entity_table {
    ($name:literal) => {
        concat!(
            "CREATE TABLE IF NOT EXISTS ",
            $name,
            " (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                parent_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL DEFAULT '{}'
            )"
        )
    };
    ($name:literal, full) => {
        concat!(
            "CREATE TABLE IF NOT EXISTS ",
            $name,
            " (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                parent_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL DEFAULT '{}',
                _version INTEGER NOT NULL DEFAULT 1,
                device_id TEXT NOT NULL DEFAULT '',
                sort_order INTEGER
            )"
        )
    };
}

macro_rules! entity_index {
    ($name:literal, $suffix:literal, $columns:literal) => {
        MigrationStep::Sql(concat!(
            "CREATE INDEX IF NOT EXISTS idx_",
            $name,
            "_",
            $suffix,
            " ON ",
            $name,
            "(",
            $columns,
            ")"
        ))
    };
}

// Storage-level guard: a row's _version may never go backwards.
macro_rules! version_guard {
    ($name:literal) => {
        MigrationStep::Sql(concat!(
            "CREATE TRIGGER IF NOT EXISTS ",
            $name,
            "_version_guard BEFORE UPDATE ON ",
            $name,
            " FOR EACH ROW
             WHEN NEW._version < OLD._version
             BEGIN
                 SELECT RAISE(ABORT, 'stale _version rejected');
             END"
        ))
    };
}

const V1_TABLES: &[&str] = &["goal_lists", "goals", "daily_tasks"];

const V1_STEPS: &[MigrationStep] = &[
    MigrationStep::Sql(entity_table!("goal_lists")),
    entity_index!("goal_lists", "user", "user_id"),
    entity_index!("goal_lists", "parent", "parent_id"),
    entity_index!("goal_lists", "updated", "updated_at DESC"),
    MigrationStep::Sql(entity_table!("goals")),
    entity_index!("goals", "user", "user_id"),
    entity_index!("goals", "parent", "parent_id"),
    entity_index!("goals", "updated", "updated_at DESC"),
    MigrationStep::Sql(entity_table!("daily_tasks")),
    entity_index!("daily_tasks", "user", "user_id"),
    entity_index!("daily_tasks", "parent", "parent_id"),
    entity_index!("daily_tasks", "updated", "updated_at DESC"),
    // Outbox: at most one pending row per entity
    MigrationStep::Sql(
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            operation TEXT NOT NULL,
            payload TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )",
    ),
    MigrationStep::Sql(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_queue_entity
         ON sync_queue(table_name, entity_id)",
    ),
    MigrationStep::Sql(
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp)",
    ),
    // Append-only conflict log
    MigrationStep::Sql(
        "CREATE TABLE IF NOT EXISTS conflict_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            winner TEXT NOT NULL,
            reason TEXT NOT NULL,
            local_version INTEGER NOT NULL,
            remote_version INTEGER NOT NULL,
            local_updated_at INTEGER NOT NULL,
            remote_updated_at INTEGER NOT NULL,
            discarded TEXT NOT NULL
        )",
    ),
    MigrationStep::Sql(
        "CREATE INDEX IF NOT EXISTS idx_conflict_history_entity
         ON conflict_history(entity_id, timestamp DESC)",
    ),
    MigrationStep::Sql(
        "CREATE INDEX IF NOT EXISTS idx_conflict_history_timestamp
         ON conflict_history(timestamp DESC)",
    ),
    // Device-local metadata (never synced)
    MigrationStep::Sql(
        "CREATE TABLE IF NOT EXISTS local_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ),
    MigrationStep::Sql(
        "INSERT OR IGNORE INTO local_meta (key, value)
         VALUES ('device_id', lower(hex(randomblob(16))))",
    ),
];

const V2_STEPS: &[MigrationStep] = &[
    MigrationStep::AddColumn {
        table: "goal_lists",
        column: "_version",
        definition: "INTEGER",
    },
    MigrationStep::AddColumn {
        table: "goal_lists",
        column: "device_id",
        definition: "TEXT",
    },
    MigrationStep::AddColumn {
        table: "goals",
        column: "_version",
        definition: "INTEGER",
    },
    MigrationStep::AddColumn {
        table: "goals",
        column: "device_id",
        definition: "TEXT",
    },
    MigrationStep::AddColumn {
        table: "daily_tasks",
        column: "_version",
        definition: "INTEGER",
    },
    MigrationStep::AddColumn {
        table: "daily_tasks",
        column: "device_id",
        definition: "TEXT",
    },
    version_guard!("goal_lists"),
    version_guard!("goals"),
    version_guard!("daily_tasks"),
];

const V3_STEPS: &[MigrationStep] = &[
    MigrationStep::AddColumn {
        table: "goal_lists",
        column: "sort_order",
        definition: "INTEGER",
    },
    MigrationStep::AddColumn {
        table: "goals",
        column: "sort_order",
        definition: "INTEGER",
    },
    MigrationStep::AddColumn {
        table: "daily_tasks",
        column: "sort_order",
        definition: "INTEGER",
    },
];

const V4_STEPS: &[MigrationStep] = &[
    MigrationStep::Sql(entity_table!("task_categories", full)),
    entity_index!("task_categories", "user", "user_id"),
    entity_index!("task_categories", "parent", "parent_id"),
    entity_index!("task_categories", "updated", "updated_at DESC"),
    version_guard!("task_categories"),
    MigrationStep::Sql(entity_table!("long_term_todos", full)),
    entity_index!("long_term_todos", "user", "user_id"),
    entity_index!("long_term_todos", "parent", "parent_id"),
    entity_index!("long_term_todos", "updated", "updated_at DESC"),
    version_guard!("long_term_todos"),
    MigrationStep::Sql(entity_table!("routines", full)),
    entity_index!("routines", "user", "user_id"),
    entity_index!("routines", "parent", "parent_id"),
    entity_index!("routines", "updated", "updated_at DESC"),
    version_guard!("routines"),
];

const V5_STEPS: &[MigrationStep] = &[MigrationStep::Sql(
    "CREATE TABLE IF NOT EXISTS offline_credentials (
        id TEXT PRIMARY KEY CHECK (id = 'current_user'),
        user_id TEXT NOT NULL,
        email TEXT NOT NULL,
        salt TEXT NOT NULL,
        derived_key TEXT NOT NULL,
        iterations INTEGER NOT NULL,
        profile TEXT NOT NULL DEFAULT '{}',
        cached_at INTEGER NOT NULL
    )",
)];

/// The full schema history, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        steps: V1_STEPS,
        backfill: None,
    },
    Migration {
        version: 2,
        name: "optimistic_concurrency",
        steps: V2_STEPS,
        backfill: Some(Backfill::DefaultVersion { tables: V1_TABLES }),
    },
    Migration {
        version: 3,
        name: "user_ordering",
        steps: V3_STEPS,
        backfill: Some(Backfill::AssignOrder { tables: V1_TABLES }),
    },
    Migration {
        version: 4,
        name: "categories_todos_routines",
        steps: V4_STEPS,
        backfill: None,
    },
    Migration {
        version: 5,
        name: "offline_credentials",
        steps: V5_STEPS,
        backfill: None,
    },
];

/// Run all pending migrations, returning the resulting schema version
pub async fn run(conn: &Connection) -> Result<u32> {
    run_migrations(conn, MIGRATIONS).await
}

/// Apply every migration in `migrations` newer than the persisted version.
///
/// The first failing migration is rolled back and reported as
/// [`Error::Migration`]; nothing after it runs.
pub async fn run_migrations(conn: &Connection, migrations: &[Migration]) -> Result<u32> {
    ensure_version_table(conn).await?;
    let mut version = get_version(conn).await?;

    let known = migrations.last().map_or(0, |migration| migration.version);
    if version > known {
        return Err(Error::Migration {
            version,
            name: "unknown",
            reason: format!("database schema v{version} is newer than this build (v{known})"),
        });
    }

    let start = version;
    for migration in migrations.iter().filter(|m| m.version > start) {
        apply(conn, migration)
            .await
            .map_err(|error| Error::Migration {
                version: migration.version,
                name: migration.name,
                reason: error.to_string(),
            })?;
        version = migration.version;
        tracing::info!(
            "Migrated database to version {} ({})",
            migration.version,
            migration.name
        );
    }

    Ok(version)
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<u32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i64 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    u32::try_from(version).map_err(|_| Error::Database(format!("Invalid schema version {version}")))
}

async fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;
    Ok(())
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute("BEGIN EXCLUSIVE TRANSACTION", ()).await?;

    let result = async {
        for step in migration.steps {
            apply_step(conn, step).await?;
        }
        if let Some(backfill) = &migration.backfill {
            apply_backfill(conn, backfill).await?;
        }
        conn.execute(
            "INSERT INTO schema_version (version, name, applied_at) VALUES (?, ?, ?)",
            libsql::params![
                i64::from(migration.version),
                migration.name,
                chrono::Utc::now().timestamp_millis()
            ],
        )
        .await?;
        Ok::<(), Error>(())
    }
    .await;

    finish(conn, result).await
}

async fn apply_step(conn: &Connection, step: &MigrationStep) -> Result<()> {
    match step {
        MigrationStep::Sql(sql) => {
            conn.execute(sql, ()).await?;
        }
        MigrationStep::AddColumn {
            table,
            column,
            definition,
        } => {
            if !column_exists(conn, table, column).await? {
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
                    (),
                )
                .await?;
            }
        }
    }
    Ok(())
}

async fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
            [table, column],
        )
        .await?;
    let count: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };
    Ok(count > 0)
}

/// Run a backfill. Safe to repeat: already-migrated rows are left alone.
pub async fn apply_backfill(conn: &Connection, backfill: &Backfill) -> Result<()> {
    match backfill {
        Backfill::DefaultVersion { tables } => {
            for table in *tables {
                conn.execute(
                    &format!("UPDATE {table} SET _version = 1 WHERE _version IS NULL"),
                    (),
                )
                .await?;
                conn.execute(
                    &format!(
                        "UPDATE {table}
                         SET device_id = COALESCE(
                             (SELECT value FROM local_meta WHERE key = 'device_id'),
                             ''
                         )
                         WHERE device_id IS NULL"
                    ),
                    (),
                )
                .await?;
            }
        }
        Backfill::AssignOrder { tables } => {
            for table in *tables {
                assign_order(conn, table).await?;
            }
        }
    }
    Ok(())
}

struct OrderRow {
    id: String,
    user_id: String,
    parent_id: Option<String>,
    sort_order: Option<i64>,
}

async fn assign_order(conn: &Connection, table: &str) -> Result<()> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT id, user_id, parent_id, sort_order FROM {table}
                 ORDER BY user_id, COALESCE(parent_id, ''), created_at DESC, id"
            ),
            (),
        )
        .await?;

    let mut scoped = Vec::new();
    while let Some(row) = rows.next().await? {
        scoped.push(OrderRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            parent_id: opt_text(&row, 2)?,
            sort_order: opt_int(&row, 3)?,
        });
    }
    drop(rows);

    let mut assigned = 0usize;
    for scope in scoped.chunk_by(|a, b| a.user_id == b.user_id && a.parent_id == b.parent_id) {
        let mut next = scope
            .iter()
            .filter_map(|row| row.sort_order)
            .max()
            .map_or(0, |max| max + 1);

        for row in scope.iter().filter(|row| row.sort_order.is_none()) {
            conn.execute(
                &format!("UPDATE {table} SET sort_order = ? WHERE id = ? AND sort_order IS NULL"),
                libsql::params![next, row.id.as_str()],
            )
            .await?;
            next += 1;
            assigned += 1;
        }
    }

    if assigned > 0 {
        tracing::debug!("Assigned sort order to {assigned} rows in {table}");
    }
    Ok(())
}
