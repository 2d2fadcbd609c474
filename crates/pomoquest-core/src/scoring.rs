//! Scoring coordinator.
//!
//! Turns timer completions into durable progress: daily point totals, session
//! history, task counters and the long-break cycle. Each completion is applied
//! as one atomic store unit, so a crash or failure halfway through leaves no
//! partial award behind.
//!
//! ## Point rules
//!
//! | Event | Points |
//! |-------|--------|
//! | Work phase completed on a task | [`POINTS_PER_POMODORO`] |
//! | Task reaches its plan, or is completed by hand or by an edit | [`BONUS_ON_TASK_COMPLETE`] |
//!
//! The completion bonus follows the `isCompleted` flag: it is paid when a
//! stored task goes from incomplete to complete, and never while it stays
//! complete.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::settings::{Settings, POMODOROS_SINCE_LONG_BREAK, TOTAL_POINTS};
use crate::storage::{DailyPoints, NewSession, SessionRecord, Store, StoreTx, Task, TaskPatch};
use crate::timer::Phase;

pub const POINTS_PER_POMODORO: i64 = 10;
pub const BONUS_ON_TASK_COMPLETE: i64 = 50;

const MAX_TOTAL_POINTS: u64 = 999_999_999;

pub fn points_rule_text() -> String {
    format!(
        "{POINTS_PER_POMODORO} per pomodoro + {BONUS_ON_TASK_COMPLETE} when task completes"
    )
}

/// Calendar day of `at` in the local timezone, `YYYY-MM-DD`.
pub fn local_date_key(at: DateTime<Utc>) -> String {
    date_key_in(at, &Local)
}

/// Calendar day of `at` in `tz`, `YYYY-MM-DD`.
pub fn date_key_in<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> String {
    at.with_timezone(tz).date_naive().format("%Y-%m-%d").to_string()
}

/// Work duration for the active task: its override when set, else the setting.
pub fn work_minutes_for(settings: &Settings, task: Option<&Task>) -> u32 {
    match task.and_then(|t| t.work_minutes_override) {
        Some(minutes) if minutes > 0 => minutes.clamp(1, 180),
        _ => settings.work_minutes,
    }
}

/// Configured length of `phase`, honouring the task override for work.
pub fn phase_minutes_for(settings: &Settings, task: Option<&Task>, phase: Phase) -> u32 {
    match phase {
        Phase::Work => work_minutes_for(settings, task),
        Phase::ShortBreak => settings.short_break_minutes,
        Phase::LongBreak => settings.long_break_minutes,
    }
}

/// Window of days shown by the points history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsRange {
    #[default]
    Week,
    Month,
    All,
}

impl PointsRange {
    /// Number of days including today, or `None` for everything.
    pub fn days(self) -> Option<u64> {
        match self {
            PointsRange::Week => Some(7),
            PointsRange::Month => Some(30),
            PointsRange::All => None,
        }
    }

    /// Keep the rows on or after the first day of the window ending `today`.
    pub fn filter(self, rows: Vec<DailyPoints>, today: NaiveDate) -> Vec<DailyPoints> {
        let Some(days) = self.days() else {
            return rows;
        };
        let cutoff = today
            .checked_sub_days(chrono::Days::new(days - 1))
            .unwrap_or(NaiveDate::MIN)
            .format("%Y-%m-%d")
            .to_string();
        rows.into_iter().filter(|r| r.date_key >= cutoff).collect()
    }
}

impl std::str::FromStr for PointsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7" | "week" => Ok(PointsRange::Week),
            "30" | "month" => Ok(PointsRange::Month),
            "all" => Ok(PointsRange::All),
            other => Err(format!("unknown range '{other}' (expected 7, 30 or all)")),
        }
    }
}

/// A finished work phase to be scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkCompletion {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub minutes_planned: u32,
    pub date_key: String,
}

/// Everything a scored work phase changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOutcome {
    pub session: SessionRecord,
    pub task: Task,
    pub points_awarded: i64,
    /// The task reached its plan with this pomodoro.
    pub task_completed: bool,
    pub daily: DailyPoints,
    pub next_phase: Phase,
    pub settings: Settings,
}

/// Result of marking a task complete by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub task: Task,
    /// Zero when the task was already complete.
    pub bonus_awarded: i64,
    pub settings: Settings,
}

/// Score a completed work phase in one atomic unit.
///
/// Awards the pomodoro points, records the session, advances the task and
/// pays the completion bonus if the task just reached its plan. Also advances
/// the long-break cycle and picks the next break.
pub fn record_work_completion(store: &Store, done: &WorkCompletion) -> Result<WorkOutcome> {
    store.atomically(|tx| record_work_completion_in(tx, done))
}

/// [`record_work_completion`] inside a unit the caller owns, so other writes
/// can commit together with the score.
pub fn record_work_completion_in(tx: &StoreTx<'_>, done: &WorkCompletion) -> Result<WorkOutcome> {
    let mut settings = Settings::load_in(tx)?;
    let task = tx
        .get_task(&done.task_id)?
        .ok_or_else(|| CoreError::task_not_found(&done.task_id))?;

    let mut daily = tx.add_points(&done.date_key, POINTS_PER_POMODORO)?;
    let session = tx.add_completed_pomodoro(&NewSession {
        task_id: task.id.clone(),
        started_at: done.started_at,
        ended_at: done.ended_at,
        minutes_planned: done.minutes_planned,
        date_key: done.date_key.clone(),
        points: POINTS_PER_POMODORO,
    })?;

    let completed = task.completed_pomodoros.saturating_add(1);
    let task_completed = !task.is_completed
        && task.planned_pomodoros > 0
        && completed >= task.planned_pomodoros;
    let task = tx.upsert_task(
        &TaskPatch::for_id(&task.id)
            .completed_pomodoros(completed)
            .completed(task.is_completed || task_completed),
    )?;

    let mut points_awarded = POINTS_PER_POMODORO;
    if task_completed {
        daily = tx.add_points(&done.date_key, BONUS_ON_TASK_COMPLETE)?;
        points_awarded += BONUS_ON_TASK_COMPLETE;
    }

    settings.pomodoros_since_long_break = settings.pomodoros_since_long_break.saturating_add(1);
    let next_phase = if settings.pomodoros_since_long_break >= settings.long_break_interval {
        settings.pomodoros_since_long_break = 0;
        Phase::LongBreak
    } else {
        Phase::ShortBreak
    };
    add_to_total(&mut settings, points_awarded);
    settings.persist_in(tx, &[POMODOROS_SINCE_LONG_BREAK, TOTAL_POINTS])?;

    tracing::debug!(
        task = %task.id,
        points = points_awarded,
        next = %next_phase,
        "work phase scored"
    );
    if task_completed {
        tracing::info!(task = %task.id, "task reached its planned pomodoros");
    }

    Ok(WorkOutcome {
        session,
        task,
        points_awarded,
        task_completed,
        daily,
        next_phase,
        settings,
    })
}

/// Mark a task complete, paying the bonus unless it was already complete.
pub fn complete_task(store: &Store, task_id: &str, at: DateTime<Utc>) -> Result<TaskCompletion> {
    let date_key = local_date_key(at);
    store.atomically(|tx| {
        let task = tx
            .get_task(task_id)?
            .ok_or_else(|| CoreError::task_not_found(task_id))?;
        if task.is_completed {
            return Ok(TaskCompletion {
                task,
                bonus_awarded: 0,
                settings: Settings::load_in(tx)?,
            });
        }
        update_task_in(tx, &TaskPatch::for_id(task_id).completed(true), &date_key)
    })
}

/// Apply an edit to a task. An edit that completes a task which was stored
/// as incomplete pays the completion bonus, whichever fields it carries.
pub fn update_task(store: &Store, patch: &TaskPatch, at: DateTime<Utc>) -> Result<TaskCompletion> {
    let date_key = local_date_key(at);
    store.atomically(|tx| update_task_in(tx, patch, &date_key))
}

fn update_task_in(tx: &StoreTx<'_>, patch: &TaskPatch, date_key: &str) -> Result<TaskCompletion> {
    let mut settings = Settings::load_in(tx)?;
    let was_open = match patch.id.as_deref() {
        Some(id) => tx.get_task(id)?.is_some_and(|task| !task.is_completed),
        None => false,
    };

    let task = tx.upsert_task(patch)?;
    if !(was_open && task.is_completed) {
        return Ok(TaskCompletion {
            task,
            bonus_awarded: 0,
            settings,
        });
    }

    tx.add_points(date_key, BONUS_ON_TASK_COMPLETE)?;
    add_to_total(&mut settings, BONUS_ON_TASK_COMPLETE);
    settings.persist_in(tx, &[TOTAL_POINTS])?;
    tracing::info!(task = %task.id, "task marked complete");

    Ok(TaskCompletion {
        task,
        bonus_awarded: BONUS_ON_TASK_COMPLETE,
        settings,
    })
}

fn add_to_total(settings: &mut Settings, points: i64) {
    let points = u64::try_from(points).unwrap_or(0);
    settings.total_points = settings
        .total_points
        .saturating_add(points)
        .min(MAX_TOTAL_POINTS);
}
