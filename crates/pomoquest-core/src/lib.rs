//! # Pomoquest Core Library
//!
//! Session timing and transactional scoring for a gamified Pomodoro task
//! tracker. All logic lives here; the `pomoquest-cli` binary is a thin
//! front end over the same library.
//!
//! ## Architecture
//!
//! - **Clock**: monotonic and wall-clock readings, swappable for tests
//! - **Timer Engine**: a drift-corrected countdown over work / short-break /
//!   long-break phases that the caller recomputes at any cadence
//! - **Storage**: SQLite store for tasks, sessions, daily points and settings,
//!   with versioned additive migrations and TOML process configuration
//! - **Scoring**: turns completed phases into points and task progress in one
//!   atomic unit
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`Store`]: Durable, transactional persistence
//! - [`PomodoroApp`]: Application context tying the two together
//! - [`Config`]: Process configuration management

pub mod app;
pub mod clock;
pub mod error;
pub mod events;
pub mod scoring;
pub mod settings;
pub mod storage;
pub mod timer;

pub use app::{Completion, PhaseOutcome, PomodoroApp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{TimerEvent, TimerObserver};
pub use scoring::{PointsRange, BONUS_ON_TASK_COMPLETE, POINTS_PER_POMODORO};
pub use settings::{AlarmSound, Settings, Theme};
pub use storage::{Config, DailyPoints, SessionRecord, Store, Task, TaskPatch};
pub use timer::{Phase, TimerEngine, TimerSnapshot, Transition};
