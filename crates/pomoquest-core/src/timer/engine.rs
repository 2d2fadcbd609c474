//! Timer engine implementation.
//!
//! The timer engine is a drift-corrected countdown over three phases. It does
//! not use internal threads - the caller is responsible for calling
//! `recompute()` periodically, at whatever cadence the host allows.
//!
//! Remaining time is never decremented per call. Every recompute derives it
//! from the value captured at the last `start()` and the monotonic time
//! elapsed since then, so a throttled or suspended caller loses no time.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(SystemClock::new(), 25);
//! engine.start();
//! // In a loop:
//! if let Transition::Completed { phase, at } = engine.recompute() {
//!     // score it, then engine.switch_phase(..)
//! }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{format_mmss, Phase};
use crate::clock::{Clock, SystemClock};
use crate::events::{TimerEvent, TimerObserver};

/// Result of one recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Completed { phase: Phase, at: DateTime<Utc> },
    Ticked { remaining_secs: u64 },
    NoChange,
}

/// Serializable engine state, used to carry a timer across process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: Phase,
    /// Unrounded remaining seconds at `saved_at`.
    pub remaining_seconds: f64,
    pub running: bool,
    pub phase_started_at: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
}

impl TimerSnapshot {
    /// A paused timer at the start of `phase`.
    pub fn paused(phase: Phase, minutes: u32, saved_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            remaining_seconds: minutes_to_secs(minutes) as f64,
            running: false,
            phase_started_at: None,
            saved_at,
        }
    }
}

/// Core timer engine.
#[derive(Debug)]
pub struct TimerEngine<C: Clock = SystemClock> {
    clock: C,
    phase: Phase,
    /// Last published remaining time, whole seconds.
    remaining_secs: u64,
    running: bool,
    /// Wall-clock time of the first start of the current phase.
    phase_started_at: Option<DateTime<Utc>>,
    /// Monotonic reading taken at the last start.
    anchor: Option<Duration>,
    remaining_at_anchor: f64,
    /// Paused at zero without having reported the completion yet.
    expired: bool,
    events: VecDeque<TimerEvent>,
}

impl<C: Clock> TimerEngine<C> {
    /// Create a paused engine in the `Work` phase.
    pub fn new(clock: C, work_minutes: u32) -> Self {
        let remaining_secs = minutes_to_secs(work_minutes);
        Self {
            clock,
            phase: Phase::Work,
            remaining_secs,
            running: false,
            phase_started_at: None,
            anchor: None,
            remaining_at_anchor: remaining_secs as f64,
            expired: false,
            events: VecDeque::new(),
        }
    }

    /// Rebuild an engine from a snapshot. A running snapshot keeps counting
    /// down by the wall-clock time that passed since it was saved.
    pub fn restore(clock: C, snapshot: &TimerSnapshot) -> Self {
        let mut remaining = snapshot.remaining_seconds.max(0.0);
        if snapshot.running {
            let away = (clock.now() - snapshot.saved_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            remaining = (remaining - away.as_secs_f64()).max(0.0);
        }
        let anchor = snapshot.running.then(|| clock.elapsed());
        let remaining_secs = snapshot.remaining_seconds.max(0.0).round() as u64;
        Self {
            phase: snapshot.phase,
            remaining_secs,
            running: snapshot.running,
            phase_started_at: snapshot.phase_started_at,
            anchor,
            remaining_at_anchor: remaining,
            expired: !snapshot.running && remaining_secs == 0,
            events: VecDeque::new(),
            clock,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase_started_at(&self) -> Option<DateTime<Utc>> {
        self.phase_started_at
    }

    pub fn display(&self) -> String {
        format_mmss(self.remaining_secs)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.phase,
            remaining_seconds: self.exact_remaining(),
            running: self.running,
            phase_started_at: self.phase_started_at,
            saved_at: self.clock.now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Returns `false` if the timer was already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        if self.phase_started_at.is_none() {
            self.phase_started_at = Some(self.clock.now());
        }
        self.running = true;
        self.expired = false;
        self.anchor = Some(self.clock.elapsed());
        self.remaining_at_anchor = self.remaining_secs as f64;
        self.events.push_back(TimerEvent::State { running: true });
        true
    }

    /// Returns `false` if the timer was already paused.
    ///
    /// Pausing when the countdown has already reached zero leaves the
    /// completion pending: the next `recompute` reports it.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        // Publish time spent since the last recompute before stopping.
        let next = self.exact_remaining().round() as u64;
        self.publish(next);
        self.halt();
        self.expired = next == 0;
        true
    }

    pub fn toggle(&mut self) {
        if self.running {
            self.pause();
        } else {
            self.start();
        }
    }

    pub fn reset_to_work(&mut self, minutes: u32) {
        self.switch_phase(Phase::Work, minutes);
    }

    pub fn switch_phase(&mut self, next: Phase, minutes: u32) {
        if self.running {
            self.halt();
        }
        self.phase = next;
        self.remaining_secs = minutes_to_secs(minutes);
        self.remaining_at_anchor = self.remaining_secs as f64;
        self.phase_started_at = None;
        self.expired = false;
        self.events.push_back(TimerEvent::Phase { phase: next });
        self.events.push_back(TimerEvent::Tick {
            remaining_secs: self.remaining_secs,
        });
    }

    /// Periodic recomputation. Call as often as convenient while running.
    pub fn recompute(&mut self) -> Transition {
        if !self.running {
            if std::mem::take(&mut self.expired) {
                return self.finish();
            }
            return Transition::NoChange;
        }
        let next = self.exact_remaining().round() as u64;
        let changed = self.publish(next);

        if next == 0 {
            self.halt();
            return self.finish();
        }

        if changed {
            Transition::Ticked {
                remaining_secs: next,
            }
        } else {
            Transition::NoChange
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn drain_events(&mut self) -> Vec<TimerEvent> {
        self.events.drain(..).collect()
    }

    /// Deliver queued events to an observer, oldest first.
    pub fn dispatch(&mut self, observer: &mut dyn TimerObserver) {
        while let Some(event) = self.events.pop_front() {
            observer.notify(&event);
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn exact_remaining(&self) -> f64 {
        match (self.running, self.anchor) {
            (true, Some(anchor)) => {
                let elapsed = self.clock.elapsed().saturating_sub(anchor);
                (self.remaining_at_anchor - elapsed.as_secs_f64()).max(0.0)
            }
            _ => self.remaining_secs as f64,
        }
    }

    /// Store a new whole-second value, emitting a tick only on change.
    fn publish(&mut self, next: u64) -> bool {
        if next == self.remaining_secs {
            return false;
        }
        self.remaining_secs = next;
        self.events.push_back(TimerEvent::Tick {
            remaining_secs: next,
        });
        true
    }

    fn finish(&mut self) -> Transition {
        let at = self.clock.now();
        tracing::debug!(phase = %self.phase, %at, "phase complete");
        self.events.push_back(TimerEvent::Complete {
            phase: self.phase,
            completed_at: at,
        });
        Transition::Completed {
            phase: self.phase,
            at,
        }
    }

    fn halt(&mut self) {
        self.running = false;
        self.anchor = None;
        self.remaining_at_anchor = self.remaining_secs as f64;
        self.events.push_back(TimerEvent::State { running: false });
    }
}

fn minutes_to_secs(minutes: u32) -> u64 {
    u64::from(minutes).saturating_mul(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap())
    }

    fn completions(events: &[TimerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TimerEvent::Complete { .. }))
            .count()
    }

    #[test]
    fn starts_paused_in_work() {
        let engine = TimerEngine::new(clock(), 25);
        assert_eq!(engine.phase(), Phase::Work);
        assert_eq!(engine.remaining_secs(), 1500);
        assert!(!engine.is_running());
        assert_eq!(engine.display(), "25:00");
    }

    #[test]
    fn start_and_pause_are_idempotent() {
        let mut engine = TimerEngine::new(clock(), 25);
        assert!(engine.start());
        assert!(!engine.start());
        assert!(engine.pause());
        assert!(!engine.pause());
        assert_eq!(
            engine.drain_events(),
            vec![
                TimerEvent::State { running: true },
                TimerEvent::State { running: false },
            ]
        );
    }

    #[test]
    fn phase_started_at_is_set_on_first_start_only() {
        let clock = clock();
        let t0 = clock.now();
        let mut engine = TimerEngine::new(clock.clone(), 25);

        engine.start();
        clock.advance_secs(30);
        engine.pause();
        clock.advance_secs(30);
        engine.start();

        assert_eq!(engine.phase_started_at(), Some(t0));
    }

    #[test]
    fn one_coarse_recompute_completes_exactly_once() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 1);
        engine.start();
        engine.drain_events();

        clock.advance_secs(61);
        let transition = engine.recompute();

        assert_eq!(engine.remaining_secs(), 0);
        assert!(!engine.is_running());
        match transition {
            Transition::Completed { phase, at } => {
                assert_eq!(phase, Phase::Work);
                assert_eq!(at, clock.now());
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert_eq!(engine.recompute(), Transition::NoChange);
        let events = engine.drain_events();
        assert_eq!(completions(&events), 1);
        assert_eq!(
            events,
            vec![
                TimerEvent::Tick { remaining_secs: 0 },
                TimerEvent::State { running: false },
                TimerEvent::Complete {
                    phase: Phase::Work,
                    completed_at: clock.now(),
                },
            ]
        );
    }

    #[test]
    fn ticks_only_when_whole_second_changes() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 1);
        engine.start();
        engine.drain_events();

        clock.advance(Duration::from_millis(250));
        assert_eq!(engine.recompute(), Transition::NoChange);
        clock.advance(Duration::from_millis(250));
        // 59.5 rounds to 60
        assert_eq!(engine.recompute(), Transition::NoChange);
        clock.advance(Duration::from_millis(250));
        assert_eq!(
            engine.recompute(),
            Transition::Ticked { remaining_secs: 59 }
        );
        assert_eq!(
            engine.drain_events(),
            vec![TimerEvent::Tick { remaining_secs: 59 }]
        );
    }

    #[test]
    fn pause_keeps_elapsed_time() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 1);
        engine.start();
        clock.advance_secs(20);
        engine.pause();
        assert_eq!(engine.remaining_secs(), 40);

        clock.advance_secs(300);
        assert_eq!(engine.recompute(), Transition::NoChange);
        assert_eq!(engine.remaining_secs(), 40);

        engine.start();
        clock.advance_secs(10);
        engine.recompute();
        assert_eq!(engine.remaining_secs(), 30);
    }

    #[test]
    fn pause_at_zero_reports_completion_on_next_recompute() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 1);
        engine.start();
        clock.advance(Duration::from_millis(59_600));
        assert!(engine.pause());
        assert_eq!(engine.remaining_secs(), 0);
        engine.drain_events();

        assert!(matches!(
            engine.recompute(),
            Transition::Completed {
                phase: Phase::Work,
                ..
            }
        ));
        assert_eq!(engine.recompute(), Transition::NoChange);
        assert_eq!(completions(&engine.drain_events()), 1);
    }

    #[test]
    fn paused_snapshot_matches_switched_engine() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 25);
        engine.start();
        clock.advance_secs(90);
        engine.switch_phase(Phase::LongBreak, 15);

        assert_eq!(
            engine.snapshot(),
            TimerSnapshot::paused(Phase::LongBreak, 15, clock.now())
        );
    }

    #[test]
    fn switch_phase_force_pauses_and_emits_phase_then_tick() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 25);
        engine.start();
        engine.drain_events();

        engine.switch_phase(Phase::ShortBreak, 5);

        assert!(!engine.is_running());
        assert_eq!(engine.phase(), Phase::ShortBreak);
        assert_eq!(engine.remaining_secs(), 300);
        assert_eq!(engine.phase_started_at(), None);
        assert_eq!(
            engine.drain_events(),
            vec![
                TimerEvent::State { running: false },
                TimerEvent::Phase {
                    phase: Phase::ShortBreak
                },
                TimerEvent::Tick {
                    remaining_secs: 300
                },
            ]
        );
    }

    #[test]
    fn reset_to_work_clears_started_at() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 25);
        engine.switch_phase(Phase::LongBreak, 15);
        engine.start();
        engine.reset_to_work(50);

        assert_eq!(engine.phase(), Phase::Work);
        assert_eq!(engine.remaining_secs(), 3000);
        assert_eq!(engine.phase_started_at(), None);
    }

    #[test]
    fn toggle_flips_running() {
        let mut engine = TimerEngine::new(clock(), 25);
        engine.toggle();
        assert!(engine.is_running());
        engine.toggle();
        assert!(!engine.is_running());
    }

    #[test]
    fn dispatch_delivers_in_order() {
        let mut engine = TimerEngine::new(clock(), 25);
        engine.start();
        engine.reset_to_work(25);

        let mut seen = Vec::new();
        let mut observer = |e: &TimerEvent| seen.push(e.clone());
        engine.dispatch(&mut observer);

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], TimerEvent::State { running: true });
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn restore_running_snapshot_counts_time_away() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 10);
        engine.start();
        clock.advance_secs(60);
        let snapshot = engine.snapshot();
        assert!((snapshot.remaining_seconds - 540.0).abs() < 1e-9);

        // New process: fresh monotonic origin, wall clock moved on two minutes.
        let later = ManualClock::new(clock.now() + chrono::Duration::seconds(120));
        let mut restored = TimerEngine::restore(later.clone(), &snapshot);
        assert!(restored.is_running());
        restored.recompute();
        assert_eq!(restored.remaining_secs(), 420);
        assert_eq!(restored.phase_started_at(), engine.phase_started_at());

        later.advance_secs(20);
        restored.recompute();
        assert_eq!(restored.remaining_secs(), 400);
    }

    #[test]
    fn restore_paused_snapshot_is_frozen() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 5);
        engine.switch_phase(Phase::ShortBreak, 5);
        let snapshot = engine.snapshot();

        let later = ManualClock::new(clock.now() + chrono::Duration::hours(3));
        let restored = TimerEngine::restore(later, &snapshot);
        assert!(!restored.is_running());
        assert_eq!(restored.phase(), Phase::ShortBreak);
        assert_eq!(restored.remaining_secs(), 300);
    }

    #[test]
    fn restore_after_deadline_completes_on_next_recompute() {
        let clock = clock();
        let mut engine = TimerEngine::new(clock.clone(), 1);
        engine.start();
        let snapshot = engine.snapshot();

        let later = ManualClock::new(clock.now() + chrono::Duration::minutes(10));
        let mut restored = TimerEngine::restore(later, &snapshot);
        assert!(matches!(
            restored.recompute(),
            Transition::Completed {
                phase: Phase::Work,
                ..
            }
        ));
    }
}
