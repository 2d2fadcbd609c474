pub mod config;
pub mod db;
pub mod points;
pub mod settings;
pub mod task;
pub mod timer;

use std::path::PathBuf;

use pomoquest_core::storage::data_dir;
use pomoquest_core::{Config, CoreError, PomodoroApp, Store, SystemClock};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Per-invocation environment: where data lives and how it is configured.
pub struct Context {
    pub data_dir: PathBuf,
    pub config: Config,
}

impl Context {
    pub fn load() -> Result<Self, CoreError> {
        let data_dir = data_dir()?;
        let config = Config::load_from(&data_dir)?;
        Ok(Self { data_dir, config })
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.database_path(&self.data_dir)
    }

    pub fn open_store(&self) -> Result<Store, CoreError> {
        Store::open(self.database_path())
    }

    /// Open the app, continuing the timer left by the previous invocation.
    pub fn open_app(&self) -> Result<PomodoroApp, CoreError> {
        PomodoroApp::open(self.open_store()?, SystemClock::new())
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
