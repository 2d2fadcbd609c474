//! End-to-end pomodoro cycles through the application context.

use chrono::{TimeZone, Utc};
use pomoquest_core::storage::TaskPatch;
use pomoquest_core::{
    Clock, ManualClock, Phase, PhaseOutcome, PomodoroApp, Settings, Store, TimerEvent,
    TimerSnapshot,
};
use serde_json::json;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap())
}

fn patch(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    v.as_object().cloned().unwrap()
}

/// Run the current phase to completion with one coarse recompute.
fn finish_phase(app: &mut PomodoroApp<ManualClock>, clock: &ManualClock) -> pomoquest_core::Completion {
    app.start().unwrap();
    clock.advance_secs(app.engine().remaining_secs() + 1);
    app.tick().unwrap().expect("phase completes")
}

#[test]
fn four_pomodoros_earn_a_long_break() {
    let store = Store::open_in_memory().unwrap();
    let task = store.upsert_task(&TaskPatch::new("Thesis").planned(10)).unwrap();
    let clock = clock();
    let mut app = PomodoroApp::boot(store, clock.clone()).unwrap();
    app.set_active_task(Some(&task.id)).unwrap();

    let mut breaks = Vec::new();
    for _ in 0..4 {
        let work = finish_phase(&mut app, &clock);
        assert_eq!(work.phase, Phase::Work);
        breaks.push(work.next_phase);
        let rest = finish_phase(&mut app, &clock);
        assert_eq!(rest.outcome, PhaseOutcome::BreakFinished);
    }

    assert_eq!(
        breaks,
        vec![Phase::ShortBreak, Phase::ShortBreak, Phase::ShortBreak, Phase::LongBreak]
    );
    assert_eq!(app.settings().pomodoros_since_long_break, 0);
    assert_eq!(app.settings().total_points, 40);
    assert_eq!(app.active_task().unwrap().completed_pomodoros, 4);
    assert_eq!(app.store().list_sessions(Some(&task.id)).unwrap().len(), 4);
}

#[test]
fn bonus_is_paid_once_when_plan_is_reached() {
    let store = Store::open_in_memory().unwrap();
    let task = store.upsert_task(&TaskPatch::new("Two step").planned(2)).unwrap();
    let clock = clock();
    let mut app = PomodoroApp::boot(store, clock.clone()).unwrap();
    app.set_active_task(Some(&task.id)).unwrap();

    let mut awarded = Vec::new();
    for _ in 0..3 {
        let work = finish_phase(&mut app, &clock);
        match work.outcome {
            PhaseOutcome::WorkScored(outcome) => awarded.push(outcome.points_awarded),
            other => panic!("expected scored work, got {other:?}"),
        }
        app.skip_break();
    }

    assert_eq!(awarded, vec![10, 60, 10]);
    // Repeating the completed flag does not pay again.
    app.store()
        .upsert_task(&TaskPatch::for_id(&task.id).completed(true))
        .unwrap();
    assert_eq!(app.mark_active_task_complete().unwrap().unwrap().bonus_awarded, 0);

    let total: i64 = app
        .store()
        .list_daily_points()
        .unwrap()
        .iter()
        .map(|r| r.points)
        .sum();
    assert_eq!(total, 80);
    assert_eq!(Settings::load(app.store()).unwrap().total_points, 80);
}

#[test]
fn timer_continues_across_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pomoquest.db");
    let clock = clock();

    let saved: String = {
        let store = Store::open(&path).unwrap();
        let task = store.upsert_task(&TaskPatch::new("Resume")).unwrap();
        let mut app = PomodoroApp::boot(store, clock.clone()).unwrap();
        app.set_active_task(Some(&task.id)).unwrap();
        app.start().unwrap();
        clock.advance_secs(10 * 60);
        app.tick().unwrap();
        let json = serde_json::to_string(&app.snapshot()).unwrap();
        app.close().unwrap();
        json
    };

    // A new process: fresh monotonic origin, wall clock moved on 5 minutes.
    let later = ManualClock::new(clock.now() + chrono::Duration::minutes(5));
    let snapshot: TimerSnapshot = serde_json::from_str(&saved).unwrap();
    let store = Store::open(&path).unwrap();
    let mut app = PomodoroApp::resume(store, later.clone(), &snapshot).unwrap();

    assert!(app.engine().is_running());
    assert!(app.active_task().is_some());
    app.tick().unwrap();
    assert_eq!(app.engine().remaining_secs(), 10 * 60);

    later.advance_secs(10 * 60);
    let done = app.tick().unwrap().expect("work completes");
    assert!(matches!(done.outcome, PhaseOutcome::WorkScored(_)));
    assert_eq!(app.today_points().unwrap(), 10);
}

#[test]
fn throttled_recompute_loses_no_time() {
    let store = Store::open_in_memory().unwrap();
    let task = store.upsert_task(&TaskPatch::new("Background tab")).unwrap();
    let clock = clock();
    let mut app = PomodoroApp::boot(store, clock.clone()).unwrap();
    app.save_settings(&patch(json!({ "workMinutes": 1 }))).unwrap();
    app.set_active_task(Some(&task.id)).unwrap();
    app.drain_events();

    app.start().unwrap();
    // Irregular callbacks: 0.4s, 7s, 20s, 33.6s.
    for ms in [400, 7_000, 20_000] {
        clock.advance(std::time::Duration::from_millis(ms));
        assert!(app.tick().unwrap().is_none());
    }
    clock.advance(std::time::Duration::from_millis(33_600));
    assert!(app.tick().unwrap().is_some());

    let events = app.drain_events();
    let completes = events
        .iter()
        .filter(|e| matches!(e, TimerEvent::Complete { .. }))
        .count();
    assert_eq!(completes, 1);
    let stop_then_complete = events.windows(2).any(|w| {
        matches!(
            (&w[0], &w[1]),
            (TimerEvent::State { running: false }, TimerEvent::Complete { .. })
        )
    });
    assert!(stop_then_complete);
}
