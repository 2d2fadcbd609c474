use clap::Subcommand;
use pomoquest_core::storage::migrations::SCHEMA_VERSION;
use serde_json::json;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum DbAction {
    /// Show the schema version of the database
    Version,
}

pub fn run(action: DbAction, ctx: &Context) -> CmdResult {
    match action {
        DbAction::Version => {
            let store = ctx.open_store()?;
            print_json(&json!({
                "path": ctx.database_path(),
                "schemaVersion": store.schema_version()?,
                "supportedVersion": SCHEMA_VERSION,
            }))?;
            store.close()?;
        }
    }
    Ok(())
}
