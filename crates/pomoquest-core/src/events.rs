use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every observable change of the timer produces an Event.
/// Callers either poll the engine's queue or hand it a [`TimerObserver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimerEvent {
    Tick {
        #[serde(rename = "remainingSeconds")]
        remaining_secs: u64,
    },
    Phase {
        phase: Phase,
    },
    State {
        running: bool,
    },
    /// The phase ran out. Always queued after the `State { running: false }`
    /// produced by the engine pausing itself.
    Complete {
        phase: Phase,
        #[serde(rename = "completedAt")]
        completed_at: DateTime<Utc>,
    },
}

/// Subscriber interface for timer events.
pub trait TimerObserver {
    fn notify(&mut self, event: &TimerEvent);
}

impl<F> TimerObserver for F
where
    F: FnMut(&TimerEvent),
{
    fn notify(&mut self, event: &TimerEvent) {
        self(event)
    }
}
