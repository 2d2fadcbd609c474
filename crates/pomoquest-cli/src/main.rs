use clap::{Parser, Subcommand};
use pomoquest_core::CoreError;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "pomoquest-cli", version, about = "Pomoquest CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Daily points and the scoring rule
    Points {
        #[command(subcommand)]
        action: commands::points::PointsAction,
    },
    /// User settings stored in the database
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        action: commands::db::DbAction,
    },
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let ctx = match Context::load() {
        Ok(ctx) => ctx,
        Err(e) => {
            init_tracing("warn");
            fail(&e);
        }
    };
    init_tracing(&ctx.config.logging.filter);

    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action, &ctx),
        Commands::Task { action } => commands::task::run(action, &ctx),
        Commands::Points { action } => commands::points::run(action, &ctx),
        Commands::Settings { action } => commands::settings::run(action, &ctx),
        Commands::Config { action } => commands::config::run(action, &ctx),
        Commands::Db { action } => commands::db::run(action, &ctx),
    };

    if let Err(e) = result {
        fail(e.as_ref());
    }
}

/// Report `e` and exit: 2 when the store cannot be used at all, 1 otherwise.
fn fail(e: &(dyn std::error::Error + 'static)) -> ! {
    eprintln!("error: {e}");
    let fatal = e
        .downcast_ref::<CoreError>()
        .is_some_and(CoreError::is_fatal);
    std::process::exit(if fatal { 2 } else { 1 });
}
