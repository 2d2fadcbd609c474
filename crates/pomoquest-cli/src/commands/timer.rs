use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use pomoquest_core::{Completion, Phase, PomodoroApp, Task};
use serde::Serialize;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print current timer state as JSON
    Status,
    /// Start the countdown (work needs a selected task)
    Start,
    /// Pause the countdown
    Pause,
    /// Start when paused, pause when running
    Toggle,
    /// Back to the start of a work phase
    Reset,
    /// End the current break and return to work
    SkipBreak,
    /// Drive the timer in the foreground until the phase ends or Ctrl-C
    Run {
        /// Start the next phase automatically after each completion
        #[arg(long)]
        auto_advance: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimerStatus<'a> {
    phase: Phase,
    label: &'static str,
    remaining_seconds: u64,
    display: String,
    running: bool,
    phase_started_at: Option<DateTime<Utc>>,
    active_task: Option<&'a Task>,
    /// Set when a phase ran out since the last command.
    #[serde(skip_serializing_if = "Option::is_none")]
    completion: Option<Completion>,
}

fn status(app: &PomodoroApp, completion: Option<Completion>) -> TimerStatus<'_> {
    let engine = app.engine();
    TimerStatus {
        phase: engine.phase(),
        label: engine.phase().label(),
        remaining_seconds: engine.remaining_secs(),
        display: engine.display(),
        running: engine.is_running(),
        phase_started_at: engine.phase_started_at(),
        active_task: app.active_task(),
        completion,
    }
}

pub fn run(action: TimerAction, ctx: &Context) -> CmdResult {
    let mut app = ctx.open_app()?;
    // Score anything that ran out while no process was watching.
    let completion = app.tick()?;

    match action {
        TimerAction::Status => {}
        TimerAction::Start => {
            app.start()?;
        }
        TimerAction::Pause => {
            app.pause();
        }
        TimerAction::Toggle => {
            app.toggle()?;
        }
        TimerAction::Reset => app.reset_timer(),
        TimerAction::SkipBreak => {
            if !app.skip_break() {
                tracing::info!("not on a break; nothing to skip");
            }
        }
        TimerAction::Run { auto_advance } => {
            app.save_timer()?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(drive(&mut app, ctx, auto_advance))?;
        }
    }

    app.save_timer()?;
    print_json(&status(&app, completion))
}

/// Recompute on a fixed cadence, printing one JSON line per completion.
async fn drive(app: &mut PomodoroApp, ctx: &Context, auto_advance: bool) -> CmdResult {
    if !app.engine().is_running() {
        app.start()?;
    }
    let period = Duration::from_millis(ctx.config.timer.tick_interval_ms.max(10));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tracing::debug!(?period, "timer loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(completion) = app.tick()? else {
                    continue;
                };
                println!("{}", serde_json::to_string(&completion)?);
                app.save_timer()?;
                if !auto_advance {
                    break;
                }
                if let Err(err) = app.start() {
                    tracing::warn!(%err, "cannot start the next phase");
                    break;
                }
            }
            signal = &mut ctrl_c => {
                signal?;
                tracing::info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}
