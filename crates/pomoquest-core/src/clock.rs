//! Clock sources for the timer engine.
//!
//! The engine needs two readings: a monotonic elapsed time for drift
//! correction and a wall-clock timestamp for `phaseStartedAt` and completion
//! stamps. Tests drive a [`ManualClock`] instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock {
    /// Monotonic time elapsed since an arbitrary, fixed origin.
    fn elapsed(&self) -> Duration;

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by `Instant` and the system time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: DateTime<Utc>,
}

/// Hand-driven clock. Clones share the same underlying time, so a test can
/// keep one handle and give another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            })),
        }
    }

    /// Move both the monotonic and the wall reading forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.elapsed += by;
        state.wall += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A panicking test thread is the only way to poison this; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn now(&self) -> DateTime<Utc> {
        self.lock().wall
    }
}
