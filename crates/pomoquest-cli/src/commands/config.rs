use clap::Subcommand;
use pomoquest_core::{Config, ConfigError};

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "timer.tick_interval_ms", "logging.filter")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction, ctx: &Context) -> CmdResult {
    match action {
        ConfigAction::Get { key } => match ctx.config.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(ConfigError::UnknownKey(key).into()),
        },
        ConfigAction::Set { key, value } => {
            let mut config = ctx.config.clone();
            config.set(&key, &value)?;
            config.save_to(&ctx.data_dir)?;
            println!("ok");
        }
        ConfigAction::List => {
            let entries: serde_json::Map<String, serde_json::Value> = ctx
                .config
                .entries()
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            print_json(&entries)?;
        }
        ConfigAction::Reset => {
            Config::default().save_to(&ctx.data_dir)?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
