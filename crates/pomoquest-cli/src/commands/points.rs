use clap::Subcommand;
use pomoquest_core::scoring::{self, local_date_key, PointsRange};
use serde_json::json;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum PointsAction {
    /// Points earned today
    Today,
    /// Daily totals, oldest first
    List {
        /// Window: 7, 30 or all
        #[arg(long, default_value = "7")]
        range: PointsRange,
    },
    /// The scoring rule
    Rule,
}

pub fn run(action: PointsAction, ctx: &Context) -> CmdResult {
    match action {
        PointsAction::Today => {
            let app = ctx.open_app()?;
            let date_key = local_date_key(chrono::Utc::now());
            print_json(&json!({
                "dateKey": date_key,
                "points": app.today_points()?,
                "totalPoints": app.settings().total_points,
            }))?;
        }
        PointsAction::List { range } => {
            let app = ctx.open_app()?;
            print_json(&app.daily_points(range)?)?;
        }
        PointsAction::Rule => {
            print_json(&json!({
                "rule": scoring::points_rule_text(),
                "pointsPerPomodoro": scoring::POINTS_PER_POMODORO,
                "bonusOnTaskComplete": scoring::BONUS_ON_TASK_COMPLETE,
            }))?;
        }
    }
    Ok(())
}
