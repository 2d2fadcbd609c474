//! SQLite-backed durable store.
//!
//! Provides persistent storage for:
//! - Tasks
//! - Completed pomodoro sessions
//! - Daily point totals
//! - Settings (key -> JSON value)
//!
//! Every operation runs as one SQLite transaction while holding the store's
//! connection mutex, so a read-modify-write can never interleave with another
//! one. [`Store::atomically`] lets callers compose several operations into a
//! single unit that is applied entirely or not at all.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::migrations::{self, SCHEMA_VERSION};
use super::records::{DailyPoints, NewSession, SessionRecord, Task, TaskPatch};
use crate::error::{CoreError, DatabaseError, Result, ValidationError};

const TASK_COLUMNS: &str = "id, title, planned_pomodoros, completed_pomodoros, work_minutes_override,
     is_completed, created_at, updated_at, completed_at";

const SESSION_COLUMNS: &str =
    "id, task_id, started_at, ended_at, minutes_planned, date_key, points";

/// Durable store handle. Open once at startup and pass it around.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open the store at `path`, upgrading it to the current schema.
    ///
    /// # Errors
    /// [`DatabaseError::StorageUnavailable`] if the file cannot be opened,
    /// [`DatabaseError::SchemaDowngrade`] if it was written by a newer build.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_target(path, SCHEMA_VERSION)
    }

    /// Open the store and upgrade it to `target` instead of the current schema.
    pub fn open_with_target(path: impl AsRef<Path>, target: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| DatabaseError::StorageUnavailable {
            path: path.clone(),
            source,
        })?;
        Self::ready(conn, Some(path), target)
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|source| DatabaseError::StorageUnavailable {
                path: PathBuf::from(":memory:"),
                source,
            })?;
        Self::ready(conn, None, SCHEMA_VERSION)
    }

    fn ready(conn: Connection, path: Option<PathBuf>, target: u32) -> Result<Self> {
        let version = migrations::migrate(&conn, target)?;
        tracing::debug!(?path, version, "store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| DatabaseError::Locked)?;
        conn.close().map_err(|(_, err)| CoreError::from(err))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.read(|tx| Ok(migrations::get_schema_version(tx.conn)?))
    }

    /// Run `f` as a single write unit. Any error rolls back every write made
    /// inside it. Storage failures come back as
    /// [`DatabaseError::TransactionAborted`]; domain errors pass through as-is.
    pub fn atomically<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Immediate, f)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::Locked)?;
        let tx = conn.transaction_with_behavior(behavior).map_err(aborted)?;
        // Dropping `tx` on the error path rolls the unit back.
        let value = f(&StoreTx { conn: &tx }).map_err(abort_unit)?;
        tx.commit().map_err(aborted)?;
        Ok(value)
    }

    // ── Single-operation convenience wrappers ────────────────────────

    pub fn get_settings(&self) -> Result<Map<String, Value>> {
        self.read(|tx| tx.get_settings())
    }

    pub fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        self.atomically(|tx| tx.set_setting(key, value))
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.read(|tx| tx.list_tasks())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.read(|tx| tx.get_task(id))
    }

    pub fn upsert_task(&self, patch: &TaskPatch) -> Result<Task> {
        self.atomically(|tx| tx.upsert_task(patch))
    }

    pub fn delete_task(&self, id: &str) -> Result<usize> {
        self.atomically(|tx| tx.delete_task(id))
    }

    pub fn add_completed_pomodoro(&self, session: &NewSession) -> Result<SessionRecord> {
        self.atomically(|tx| tx.add_completed_pomodoro(session))
    }

    pub fn add_points(&self, date_key: &str, delta: i64) -> Result<DailyPoints> {
        self.atomically(|tx| tx.add_points(date_key, delta))
    }

    pub fn daily_points(&self, date_key: &str) -> Result<Option<DailyPoints>> {
        self.read(|tx| tx.daily_points(date_key))
    }

    pub fn list_daily_points(&self) -> Result<Vec<DailyPoints>> {
        self.read(|tx| tx.list_daily_points())
    }

    pub fn list_sessions(&self, task_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        self.read(|tx| tx.list_sessions(task_id))
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.read(|tx| tx.kv_get(key))
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.atomically(|tx| tx.kv_set(key, value))
    }
}

fn aborted(err: rusqlite::Error) -> CoreError {
    DatabaseError::TransactionAborted(err.to_string()).into()
}

fn abort_unit(err: CoreError) -> CoreError {
    match err {
        CoreError::Database(DatabaseError::QueryFailed(message)) => {
            DatabaseError::TransactionAborted(message).into()
        }
        other => other,
    }
}

/// Operations available inside one atomic unit.
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

impl StoreTx<'_> {
    pub fn get_settings(&self) -> Result<Map<String, Value>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Map::new();
        for row in rows {
            let (key, raw) = row?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    out.insert(key, value);
                }
                Err(err) => tracing::warn!(%key, %err, "skipping unreadable setting"),
            }
        }
        Ok(out)
    }

    pub fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, format_ts(now())],
        )?;
        Ok(())
    }

    /// Incomplete tasks first, then most recently touched first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             ORDER BY is_completed ASC, COALESCE(NULLIF(updated_at, ''), created_at) DESC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_task)
            .optional()?)
    }

    /// Create or merge a task.
    ///
    /// `completed_at` is stamped the first time the task becomes complete and
    /// kept on repeated completion; `completed_pomodoros` never goes down.
    pub fn upsert_task(&self, patch: &TaskPatch) -> Result<Task> {
        let existing = match patch.id.as_deref() {
            Some(id) => self.get_task(id)?,
            None => None,
        };
        let existing = existing.as_ref();
        let now = now();

        let title = patch
            .title
            .as_deref()
            .or_else(|| existing.map(|t| t.title.as_str()))
            .unwrap_or("")
            .trim()
            .to_string();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let prior_completed = existing.map_or(0, |t| t.completed_pomodoros);
        let completed_pomodoros = patch
            .completed_pomodoros
            .unwrap_or(prior_completed)
            .max(prior_completed);
        if patch.completed_pomodoros.is_some_and(|n| n < prior_completed) {
            tracing::debug!(
                id = ?patch.id,
                requested = ?patch.completed_pomodoros,
                kept = prior_completed,
                "ignoring decrease of completed pomodoros"
            );
        }

        let is_completed = patch
            .is_completed
            .or_else(|| existing.map(|t| t.is_completed))
            .unwrap_or(false);
        let completed_at = if is_completed {
            Some(existing.and_then(|t| t.completed_at).unwrap_or(now))
        } else {
            None
        };

        let task = Task {
            id: patch
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            title,
            planned_pomodoros: patch
                .planned_pomodoros
                .or_else(|| existing.map(|t| t.planned_pomodoros))
                .unwrap_or(0),
            completed_pomodoros,
            work_minutes_override: match patch.work_minutes_override {
                Some(minutes) => minutes,
                None => existing.and_then(|t| t.work_minutes_override),
            }
            .filter(|m| *m > 0),
            is_completed,
            created_at: existing.map_or(now, |t| t.created_at),
            updated_at: now,
            completed_at,
        };

        self.conn.execute(
            "INSERT INTO tasks (
                id, title, planned_pomodoros, completed_pomodoros, work_minutes_override,
                is_completed, created_at, updated_at, completed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                planned_pomodoros = excluded.planned_pomodoros,
                completed_pomodoros = excluded.completed_pomodoros,
                work_minutes_override = excluded.work_minutes_override,
                is_completed = excluded.is_completed,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at",
            params![
                task.id,
                task.title,
                task.planned_pomodoros,
                task.completed_pomodoros,
                task.work_minutes_override,
                task.is_completed,
                format_ts(task.created_at),
                format_ts(task.updated_at),
                task.completed_at.map(format_ts),
            ],
        )?;
        tracing::debug!(id = %task.id, created = existing.is_none(), "task upserted");
        Ok(task)
    }

    /// Delete a task together with all of its sessions. Returns the number of
    /// sessions removed.
    pub fn delete_task(&self, id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(CoreError::task_not_found(id));
        }
        let sessions = self
            .conn
            .execute("DELETE FROM sessions WHERE task_id = ?1", params![id])?;
        tracing::debug!(%id, sessions, "task deleted");
        Ok(sessions)
    }

    /// Insert a completed session. The task must exist; nothing else changes.
    pub fn add_completed_pomodoro(&self, session: &NewSession) -> Result<SessionRecord> {
        let task_exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
            params![session.task_id],
            |row| row.get(0),
        )?;
        if !task_exists {
            return Err(CoreError::task_not_found(&session.task_id));
        }

        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            task_id: session.task_id.clone(),
            started_at: session.started_at.trunc_subsecs(3),
            ended_at: session.ended_at.trunc_subsecs(3),
            minutes_planned: session.minutes_planned,
            date_key: session.date_key.clone(),
            points: session.points,
        };
        self.conn.execute(
            "INSERT INTO sessions (id, task_id, started_at, ended_at, minutes_planned, date_key, points)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.task_id,
                format_ts(record.started_at),
                format_ts(record.ended_at),
                record.minutes_planned,
                record.date_key,
                record.points,
            ],
        )?;
        Ok(record)
    }

    /// Add `delta` to the day's total in one statement; repeated calls accumulate.
    pub fn add_points(&self, date_key: &str, delta: i64) -> Result<DailyPoints> {
        let row = self.conn.query_row(
            "INSERT INTO daily_points (date_key, points, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(date_key) DO UPDATE SET
                points = points + excluded.points,
                updated_at = excluded.updated_at
             RETURNING date_key, points, updated_at",
            params![date_key, delta, format_ts(now())],
            row_to_daily_points,
        )?;
        Ok(row)
    }

    pub fn daily_points(&self, date_key: &str) -> Result<Option<DailyPoints>> {
        Ok(self
            .conn
            .query_row(
                "SELECT date_key, points, updated_at FROM daily_points WHERE date_key = ?1",
                params![date_key],
                row_to_daily_points,
            )
            .optional()?)
    }

    pub fn list_daily_points(&self) -> Result<Vec<DailyPoints>> {
        let mut stmt = self.conn.prepare(
            "SELECT date_key, points, updated_at FROM daily_points ORDER BY date_key ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_daily_points)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sessions ordered by end time, optionally restricted to one task.
    pub fn list_sessions(&self, task_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE ?1 IS NULL OR task_id = ?1
             ORDER BY ended_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![task_id], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get a value from the kv table.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Set a value in the kv table.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, format_ts(now())],
        )?;
        Ok(())
    }
}

/// Millisecond-precision wall clock, matching what a stored row reads back as.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Fixed-width RFC 3339, so string order is time order.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;
    let created_at = parse_ts(6, &created_at)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        planned_pomodoros: row.get(2)?,
        completed_pomodoros: row.get(3)?,
        work_minutes_override: row.get(4)?,
        is_completed: row.get(5)?,
        created_at,
        updated_at: if updated_at.is_empty() {
            created_at
        } else {
            parse_ts(7, &updated_at)?
        },
        completed_at: completed_at.as_deref().map(|s| parse_ts(8, s)).transpose()?,
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    let started_at: String = row.get(2)?;
    let ended_at: String = row.get(3)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        started_at: parse_ts(2, &started_at)?,
        ended_at: parse_ts(3, &ended_at)?,
        minutes_planned: row.get(4)?,
        date_key: row.get(5)?,
        points: row.get(6)?,
    })
}

fn row_to_daily_points(row: &rusqlite::Row) -> rusqlite::Result<DailyPoints> {
    let updated_at: String = row.get(2)?;
    Ok(DailyPoints {
        date_key: row.get(0)?,
        points: row.get(1)?,
        updated_at: parse_ts(2, &updated_at)?,
    })
}
