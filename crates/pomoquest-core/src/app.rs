//! Application context.
//!
//! [`PomodoroApp`] owns the store handle, the timer engine, the normalized
//! settings and the active task. It is the only place that applies the
//! "no work without a task" rule and the only caller of the scoring
//! coordinator, so every front end (CLI, GUI) shares one sequencing of
//! completion, scoring and phase changes.
//!
//! The timer is saved in the store's kv table. A scored work phase writes the
//! follow-up timer state in the same unit as the points, so a process that
//! dies before saving its timer cannot score that phase again on restart.

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::TimerEvent;
use crate::scoring::{
    self, local_date_key, phase_minutes_for, work_minutes_for, PointsRange, TaskCompletion,
    WorkCompletion, WorkOutcome,
};
use crate::settings::{Settings, ACTIVE_TASK_ID};
use crate::storage::{DailyPoints, Store, StoreTx, Task, TaskPatch};
use crate::timer::{Phase, TimerEngine, TimerSnapshot, Transition};

const TIMER_STATE_KEY: &str = "timer";

/// What a finished phase led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PhaseOutcome {
    /// Work finished on the active task and was scored.
    WorkScored(Box<WorkOutcome>),
    /// Work finished with no active task; nothing was recorded.
    WorkDiscarded,
    BreakFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub phase: Phase,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub outcome: PhaseOutcome,
    /// Phase the timer was switched to.
    pub next_phase: Phase,
    /// The host should play `settings.alarm_sound`.
    pub sound_alarm: bool,
}

pub struct PomodoroApp<C: Clock = SystemClock> {
    store: Store,
    engine: TimerEngine<C>,
    settings: Settings,
    active_task: Option<Task>,
}

impl<C: Clock> PomodoroApp<C> {
    /// Load settings and the active task, and put the timer at the start of
    /// a work phase.
    pub fn boot(store: Store, clock: C) -> Result<Self> {
        let (settings, active_task) = load_state(&store)?;
        let minutes = work_minutes_for(&settings, active_task.as_ref());
        Ok(Self {
            engine: TimerEngine::new(clock, minutes),
            store,
            settings,
            active_task,
        })
    }

    /// Continue the timer saved in the store, or [`boot`](Self::boot) if
    /// there is none.
    pub fn open(store: Store, clock: C) -> Result<Self> {
        match stored_snapshot(&store)? {
            Some(snapshot) => Self::resume(store, clock, &snapshot),
            None => Self::boot(store, clock),
        }
    }

    /// Like [`boot`](Self::boot), but continue from `snapshot`. A timer state
    /// the store saved at or after `snapshot` wins over it.
    pub fn resume(store: Store, clock: C, snapshot: &TimerSnapshot) -> Result<Self> {
        let (settings, active_task) = load_state(&store)?;
        let stored = stored_snapshot(&store)?;
        let snapshot = match stored {
            Some(ref stored) if stored.saved_at >= snapshot.saved_at => {
                if stored != snapshot {
                    tracing::debug!(saved_at = %stored.saved_at, "resuming from newer stored timer");
                }
                stored
            }
            _ => snapshot,
        };
        Ok(Self {
            engine: TimerEngine::restore(clock, snapshot),
            store,
            settings,
            active_task,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &TimerEngine<C> {
        &self.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active_task.as_ref()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.engine.snapshot()
    }

    /// Persist the timer so the next [`open`](Self::open) continues it.
    pub fn save_timer(&self) -> Result<()> {
        let snapshot = self.engine.snapshot();
        self.store.atomically(|tx| write_snapshot(tx, &snapshot))
    }

    pub fn drain_events(&mut self) -> Vec<TimerEvent> {
        self.engine.drain_events()
    }

    /// Release the store, surfacing any error from closing it.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    // ── Timer ────────────────────────────────────────────────────────

    /// Start the countdown. A work phase needs an active task.
    pub fn start(&mut self) -> Result<bool> {
        if self.engine.phase() == Phase::Work && self.active_task.is_none() {
            return Err(ValidationError::NoActiveTask.into());
        }
        Ok(self.engine.start())
    }

    pub fn pause(&mut self) -> bool {
        self.engine.pause()
    }

    /// Start when paused, pause when running. Returns whether it now runs.
    pub fn toggle(&mut self) -> Result<bool> {
        if self.engine.is_running() {
            self.engine.pause();
        } else {
            self.start()?;
        }
        Ok(self.engine.is_running())
    }

    /// Recompute the countdown and, if the phase ran out, score it and move
    /// to the next phase.
    ///
    /// If scoring fails the timer stays at zero in the finished phase, and the
    /// next `start` + `tick` retries the whole unit.
    pub fn tick(&mut self) -> Result<Option<Completion>> {
        match self.engine.recompute() {
            Transition::Completed { phase, at } => self.complete(phase, at).map(Some),
            Transition::Ticked { .. } | Transition::NoChange => Ok(None),
        }
    }

    pub fn reset_timer(&mut self) {
        self.engine.reset_to_work(self.work_minutes());
    }

    /// Jump from a break straight to work. Returns `false` during work.
    pub fn skip_break(&mut self) -> bool {
        if self.engine.phase() == Phase::Work {
            return false;
        }
        self.engine.switch_phase(Phase::Work, self.work_minutes());
        true
    }

    // ── Tasks and settings ───────────────────────────────────────────

    /// Select the task work phases are scored against, or clear it.
    pub fn set_active_task(&mut self, task_id: Option<&str>) -> Result<Option<&Task>> {
        let task = match task_id {
            Some(id) => Some(
                self.store
                    .get_task(id)?
                    .ok_or_else(|| CoreError::task_not_found(id))?,
            ),
            None => None,
        };

        let mut patch = Map::new();
        patch.insert(
            ACTIVE_TASK_ID.to_string(),
            task.as_ref().map_or(Value::Null, |t| Value::from(t.id.clone())),
        );
        self.settings = Settings::save_patch(&self.store, &patch)?;
        self.active_task = task;
        self.reset_timer();
        Ok(self.active_task.as_ref())
    }

    /// Normalize and persist `patch`, then restart the work phase with the
    /// resulting durations.
    pub fn save_settings(&mut self, patch: &Map<String, Value>) -> Result<&Settings> {
        self.settings = Settings::save_patch(&self.store, patch)?;
        self.active_task = match self.settings.active_task_id.as_deref() {
            Some(id) => self.store.get_task(id)?,
            None => None,
        };
        self.reset_timer();
        Ok(&self.settings)
    }

    /// Edit a task. Completing a task this way pays the bonus like any
    /// other completion.
    pub fn update_task(&mut self, patch: &TaskPatch) -> Result<TaskCompletion> {
        let done = scoring::update_task(&self.store, patch, self.engine.clock().now())?;
        self.absorb(&done);
        Ok(done)
    }

    /// Mark a task complete and pay the bonus if it was not yet.
    pub fn complete_task(&mut self, task_id: &str) -> Result<TaskCompletion> {
        let done = scoring::complete_task(&self.store, task_id, self.engine.clock().now())?;
        self.absorb(&done);
        Ok(done)
    }

    pub fn mark_active_task_complete(&mut self) -> Result<Option<TaskCompletion>> {
        match self.active_task.as_ref().map(|t| t.id.clone()) {
            Some(id) => self.complete_task(&id).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a task and its history. Deleting the active task clears the
    /// selection and resets the timer. Returns the number of sessions removed.
    pub fn delete_task(&mut self, task_id: &str) -> Result<usize> {
        let removed = self.store.delete_task(task_id)?;
        if self.settings.active_task_id.as_deref() == Some(task_id) {
            self.set_active_task(None)?;
        }
        Ok(removed)
    }

    pub fn delete_active_task(&mut self) -> Result<Option<usize>> {
        match self.active_task.as_ref().map(|t| t.id.clone()) {
            Some(id) => self.delete_task(&id).map(Some),
            None => Ok(None),
        }
    }

    // ── Points ───────────────────────────────────────────────────────

    pub fn today_points(&self) -> Result<i64> {
        let key = local_date_key(self.engine.clock().now());
        Ok(self.store.daily_points(&key)?.map_or(0, |row| row.points))
    }

    pub fn daily_points(&self, range: PointsRange) -> Result<Vec<DailyPoints>> {
        let today = self.engine.clock().now().with_timezone(&Local).date_naive();
        Ok(range.filter(self.store.list_daily_points()?, today))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn work_minutes(&self) -> u32 {
        work_minutes_for(&self.settings, self.active_task.as_ref())
    }

    fn absorb(&mut self, done: &TaskCompletion) {
        self.settings = done.settings.clone();
        if self.settings.active_task_id.as_deref() == Some(done.task.id.as_str()) {
            self.active_task = Some(done.task.clone());
        }
    }

    fn complete(
        &mut self,
        phase: Phase,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Completion> {
        if phase.is_break() {
            let next_phase = Phase::Work;
            self.engine.switch_phase(next_phase, self.work_minutes());
            self.save_timer()?;
            return Ok(Completion {
                phase,
                completed_at: at,
                outcome: PhaseOutcome::BreakFinished,
                next_phase,
                sound_alarm: self.settings.sound_enabled,
            });
        }

        let Some(task) = self.active_task.as_ref() else {
            tracing::warn!(%at, "work phase finished without an active task; discarded");
            self.reset_timer();
            self.save_timer()?;
            return Ok(Completion {
                phase,
                completed_at: at,
                outcome: PhaseOutcome::WorkDiscarded,
                next_phase: Phase::Work,
                sound_alarm: false,
            });
        };

        let done = WorkCompletion {
            task_id: task.id.clone(),
            started_at: self.engine.phase_started_at().unwrap_or(at),
            ended_at: at,
            minutes_planned: self.work_minutes(),
            date_key: local_date_key(at),
        };
        let (outcome, minutes) = self.store.atomically(|tx| {
            let outcome = scoring::record_work_completion_in(tx, &done)?;
            let minutes =
                phase_minutes_for(&outcome.settings, Some(&outcome.task), outcome.next_phase);
            write_snapshot(tx, &TimerSnapshot::paused(outcome.next_phase, minutes, at))?;
            Ok((outcome, minutes))
        })?;

        self.settings = outcome.settings.clone();
        self.active_task = Some(outcome.task.clone());
        let next_phase = outcome.next_phase;
        self.engine.switch_phase(next_phase, minutes);

        Ok(Completion {
            phase,
            completed_at: at,
            outcome: PhaseOutcome::WorkScored(Box::new(outcome)),
            next_phase,
            sound_alarm: self.settings.sound_enabled,
        })
    }
}

fn stored_snapshot(store: &Store) -> Result<Option<TimerSnapshot>> {
    let Some(raw) = store.kv_get(TIMER_STATE_KEY)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => {
            tracing::warn!(%err, "ignoring unreadable timer state");
            Ok(None)
        }
    }
}

fn write_snapshot(tx: &StoreTx<'_>, snapshot: &TimerSnapshot) -> Result<()> {
    tx.kv_set(TIMER_STATE_KEY, &serde_json::to_string(snapshot)?)
}

fn load_state(store: &Store) -> Result<(Settings, Option<Task>)> {
    let settings = Settings::load(store)?;
    let active_task = match settings.active_task_id.as_deref() {
        Some(id) => {
            let task = store.get_task(id)?;
            if task.is_none() {
                tracing::warn!(%id, "active task no longer exists");
            }
            task
        }
        None => None,
    };
    Ok((settings, active_task))
}
