use clap::Subcommand;
use pomoquest_core::settings::SETTING_KEYS;
use pomoquest_core::ValidationError;
use serde_json::{Map, Value};

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Get one setting (e.g. "workMinutes", "alarmSound")
    Get {
        /// Setting name
        key: String,
    },
    /// Set a setting; out-of-range values are clamped
    Set {
        /// Setting name
        key: String,
        /// New value, parsed as JSON when possible
        value: String,
    },
    /// List all settings
    List,
}

fn known_key(key: &str) -> Result<(), ValidationError> {
    if SETTING_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: key.to_string(),
            message: format!("unknown setting (known: {})", SETTING_KEYS.join(", ")),
        })
    }
}

/// `25` and `true` become numbers and booleans, anything else stays a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn run(action: SettingsAction, ctx: &Context) -> CmdResult {
    match action {
        SettingsAction::Get { key } => {
            known_key(&key)?;
            let app = ctx.open_app()?;
            print_json(&app.settings().get(&key).unwrap_or(Value::Null))?;
        }
        SettingsAction::Set { key, value } => {
            known_key(&key)?;
            let mut app = ctx.open_app()?;
            let mut patch = Map::new();
            patch.insert(key, parse_value(&value));
            let settings = app.save_settings(&patch)?.to_map();
            app.save_timer()?;
            print_json(&settings)?;
        }
        SettingsAction::List => {
            let app = ctx.open_app()?;
            print_json(&app.settings().to_map())?;
        }
    }
    Ok(())
}
