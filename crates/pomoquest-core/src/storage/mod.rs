mod config;
pub mod migrations;
mod records;
mod store;

pub use config::{Config, LoggingConfig, StorageConfig, TimerConfig};
pub use records::{DailyPoints, NewSession, SessionRecord, Task, TaskPatch};
pub use store::{Store, StoreTx};

use std::path::PathBuf;

use crate::error::Result;

/// Returns the data directory, creating it if needed.
///
/// `POMOQUEST_DATA_DIR` wins when set. Otherwise `~/.config/pomoquest[-dev]/`,
/// with POMOQUEST_ENV=dev selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("POMOQUEST_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("POMOQUEST_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pomoquest-dev")
            } else {
                base_dir.join("pomoquest")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
