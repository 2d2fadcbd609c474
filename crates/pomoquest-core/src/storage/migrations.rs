//! Database schema migrations for pomoquest.
//!
//! Migrations are versioned and applied automatically when opening the store.
//! The `schema_version` table tracks the current migration version. Every
//! step only adds structure and checks for it first, so an interrupted upgrade
//! can simply be run again.

use rusqlite::{Connection, OptionalExtension};

use crate::error::DatabaseError;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: u32 = 4;

/// Bring the database up to `target`, returning the version it ends at.
///
/// # Errors
/// Returns [`DatabaseError::SchemaDowngrade`] if the store is already past
/// `target`, or [`DatabaseError::MigrationFailed`] if a step fails. A failed
/// step leaves the store at the previous version.
pub fn migrate(conn: &Connection, target: u32) -> Result<u32, DatabaseError> {
    create_schema_version_table(conn).map_err(failed)?;

    let current = get_schema_version(conn).map_err(failed)?;
    if current > target {
        return Err(DatabaseError::SchemaDowngrade {
            found: current,
            target,
        });
    }

    let steps: [(u32, fn(&Connection) -> rusqlite::Result<()>); 4] = [
        (1, migrate_v1),
        (2, migrate_v2),
        (3, migrate_v3),
        (4, migrate_v4),
    ];

    let mut version = current;
    for (step, apply) in steps {
        if version < step && step <= target {
            let tx = conn.unchecked_transaction().map_err(failed)?;
            apply(&tx).map_err(failed)?;
            set_schema_version(&tx, step).map_err(failed)?;
            tx.commit().map_err(failed)?;
            tracing::info!(from = version, to = step, "applied schema migration");
            version = step;
        }
    }

    Ok(version)
}

fn failed(err: rusqlite::Error) -> DatabaseError {
    DatabaseError::MigrationFailed(err.to_string())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Migration v1: tasks and completed sessions.
fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                   TEXT PRIMARY KEY,
            title                TEXT NOT NULL,
            planned_pomodoros    INTEGER NOT NULL DEFAULT 0,
            completed_pomodoros  INTEGER NOT NULL DEFAULT 0,
            is_completed         INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL DEFAULT '',
            completed_at         TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            task_id          TEXT NOT NULL,
            started_at       TEXT NOT NULL,
            ended_at         TEXT NOT NULL,
            minutes_planned  INTEGER NOT NULL,
            date_key         TEXT NOT NULL,
            points           INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_is_completed ON tasks(is_completed);
        CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_task_id ON sessions(task_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_date_key ON sessions(date_key);",
    )
}

/// Migration v2: daily point totals and settings.
fn migrate_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_points (
            date_key    TEXT PRIMARY KEY,
            points      INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}

/// Migration v3: per-task work duration override.
fn migrate_v3(conn: &Connection) -> rusqlite::Result<()> {
    if !column_exists(conn, "tasks", "work_minutes_override")? {
        conn.execute_batch("ALTER TABLE tasks ADD COLUMN work_minutes_override INTEGER;")?;
    }
    Ok(())
}

/// Migration v4: key-value state, used for the saved timer.
fn migrate_v4(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    /// Test migration from scratch (v0 -> v4)
    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(migrate(&conn, SCHEMA_VERSION).unwrap(), 4);
        assert_eq!(get_schema_version(&conn).unwrap(), 4);

        for table in ["tasks", "sessions", "daily_points", "settings", "kv"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
        assert!(column_exists(&conn, "tasks", "work_minutes_override").unwrap());
    }

    /// Test that migrations are idempotent
    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, SCHEMA_VERSION).unwrap();
        migrate(&conn, SCHEMA_VERSION).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 4);
    }

    /// An upgrade interrupted after creating structures but before recording
    /// the version must re-run cleanly.
    #[test]
    fn test_rerun_over_partial_upgrade() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, 1).unwrap();

        // v2..v4 structures already present, version still says 1.
        migrate_v2(&conn).unwrap();
        migrate_v3(&conn).unwrap();
        migrate_v4(&conn).unwrap();

        assert_eq!(migrate(&conn, SCHEMA_VERSION).unwrap(), 4);
        assert!(column_exists(&conn, "tasks", "work_minutes_override").unwrap());
    }

    /// Test incremental migration (v1 -> v4) keeps existing rows
    #[test]
    fn test_incremental_migration_preserves_data() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, 1).unwrap();
        assert!(!table_exists(&conn, "daily_points"));

        conn.execute(
            "INSERT INTO tasks (id, title, created_at, updated_at)
             VALUES ('task1', 'Write report', '2024-01-01T12:00:00.000Z', '2024-01-01T12:00:00.000Z')",
            [],
        )
        .unwrap();

        migrate(&conn, SCHEMA_VERSION).unwrap();

        let (title, override_minutes): (String, Option<u32>) = conn
            .query_row(
                "SELECT title, work_minutes_override FROM tasks WHERE id = 'task1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "Write report");
        assert_eq!(override_minutes, None);
    }

    #[test]
    fn test_downgrade_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, SCHEMA_VERSION).unwrap();

        let err = migrate(&conn, 2).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::SchemaDowngrade {
                found: 4,
                target: 2
            }
        ));
        assert_eq!(get_schema_version(&conn).unwrap(), 4);
    }
}
