//! Task management commands for CLI.

use clap::Subcommand;
use pomoquest_core::{CoreError, TaskPatch};
use serde_json::json;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Create {
        /// Task title
        title: String,
        /// Planned pomodoros (0 = no plan)
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..=999))]
        planned: u32,
        /// Work minutes for this task (0 = use the workMinutes setting)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=180))]
        work_minutes: Option<u32>,
        /// Make it the active task
        #[arg(long)]
        select: bool,
    },
    /// List tasks, incomplete first
    List,
    /// Get task details
    Get {
        /// Task ID
        id: String,
    },
    /// Update a task
    Update {
        /// Task ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New planned pomodoros
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=999))]
        planned: Option<u32>,
        /// New work minutes (0 clears the override)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=180))]
        work_minutes: Option<u32>,
        /// Set completed status
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Mark a task complete, paying the completion bonus once
    Complete {
        /// Task ID (defaults to the active task)
        id: Option<String>,
    },
    /// Delete a task and its pomodoro history
    Delete {
        /// Task ID
        id: String,
    },
    /// Choose the task work sessions count towards
    Select {
        /// Task ID
        id: Option<String>,
        /// Clear the selection instead
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}

fn override_minutes(minutes: u32) -> Option<u32> {
    (minutes > 0).then_some(minutes)
}

pub fn run(action: TaskAction, ctx: &Context) -> CmdResult {
    match action {
        TaskAction::Create {
            title,
            planned,
            work_minutes,
            select,
        } => {
            let store = ctx.open_store()?;
            let mut patch = TaskPatch::new(title).planned(planned);
            if let Some(minutes) = work_minutes {
                patch = patch.work_minutes_override(override_minutes(minutes));
            }
            let task = store.upsert_task(&patch)?;
            store.close()?;

            if select {
                let mut app = ctx.open_app()?;
                app.set_active_task(Some(&task.id))?;
                app.save_timer()?;
            }
            print_json(&task)?;
        }
        TaskAction::List => {
            let store = ctx.open_store()?;
            print_json(&store.list_tasks()?)?;
        }
        TaskAction::Get { id } => {
            let store = ctx.open_store()?;
            let task = store
                .get_task(&id)?
                .ok_or_else(|| CoreError::task_not_found(&id))?;
            print_json(&task)?;
        }
        TaskAction::Update {
            id,
            title,
            planned,
            work_minutes,
            completed,
        } => {
            let mut app = ctx.open_app()?;
            if app.store().get_task(&id)?.is_none() {
                return Err(CoreError::task_not_found(&id).into());
            }
            let mut patch = TaskPatch::for_id(&id);
            patch.title = title;
            patch.planned_pomodoros = planned;
            patch.work_minutes_override = work_minutes.map(override_minutes);
            patch.is_completed = completed;
            let done = app.update_task(&patch)?;
            if done.bonus_awarded > 0 {
                tracing::info!(task = %done.task.id, bonus = done.bonus_awarded, "completion bonus paid");
            }
            print_json(&done.task)?;
        }
        TaskAction::Complete { id } => {
            let mut app = ctx.open_app()?;
            let done = match id {
                Some(id) => Some(app.complete_task(&id)?),
                None => app.mark_active_task_complete()?,
            };
            app.save_timer()?;
            match done {
                Some(done) => print_json(&done)?,
                None => print_json(&json!({ "completed": null, "reason": "no active task" }))?,
            }
        }
        TaskAction::Delete { id } => {
            let mut app = ctx.open_app()?;
            let sessions = app.delete_task(&id)?;
            app.save_timer()?;
            print_json(&json!({ "deleted": id, "sessionsRemoved": sessions }))?;
        }
        TaskAction::Select { id, clear } => {
            let mut app = ctx.open_app()?;
            let target = if clear { None } else { id.as_deref() };
            if target.is_none() && !clear {
                return Err("pass a task ID or --clear".into());
            }
            let selected = app.set_active_task(target)?.cloned();
            app.save_timer()?;
            print_json(&json!({ "activeTask": selected }))?;
        }
    }
    Ok(())
}
