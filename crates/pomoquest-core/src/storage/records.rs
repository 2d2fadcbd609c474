//! Row types for the four persisted collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub planned_pomodoros: u32,
    pub completed_pomodoros: u32,
    /// Per-task work duration in minutes, replacing `workMinutes` while active.
    pub work_minutes_override: Option<u32>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly when `is_completed` is true.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// True once the planned count is positive and reached.
    pub fn reached_plan(&self) -> bool {
        self.planned_pomodoros > 0 && self.completed_pomodoros >= self.planned_pomodoros
    }
}

/// Partial task used by `upsert_task`.
///
/// `None` fields keep the stored value (or the default on creation).
/// `work_minutes_override` is doubly optional so callers can clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub id: Option<String>,
    pub title: Option<String>,
    pub planned_pomodoros: Option<u32>,
    pub completed_pomodoros: Option<u32>,
    pub work_minutes_override: Option<Option<u32>>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    /// A patch that creates a new task.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// A patch against an existing task.
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn planned(mut self, planned: u32) -> Self {
        self.planned_pomodoros = Some(planned);
        self
    }

    pub fn completed_pomodoros(mut self, count: u32) -> Self {
        self.completed_pomodoros = Some(count);
        self
    }

    pub fn work_minutes_override(mut self, minutes: Option<u32>) -> Self {
        self.work_minutes_override = Some(minutes);
        self
    }

    pub fn completed(mut self, done: bool) -> Self {
        self.is_completed = Some(done);
        self
    }
}

impl From<&Task> for TaskPatch {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: Some(task.title.clone()),
            planned_pomodoros: Some(task.planned_pomodoros),
            completed_pomodoros: Some(task.completed_pomodoros),
            work_minutes_override: Some(task.work_minutes_override),
            is_completed: Some(task.is_completed),
        }
    }
}

/// A completed pomodoro. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub minutes_planned: u32,
    /// Local calendar day of `ended_at`, `YYYY-MM-DD`.
    pub date_key: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub minutes_planned: u32,
    pub date_key: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoints {
    pub date_key: String,
    pub points: i64,
    pub updated_at: DateTime<Utc>,
}
