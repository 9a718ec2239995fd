pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rudder_core::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "rudder",
    about = "Rudder conversational agent CLI",
    long_about = "Drive conversation turns, resolve pending approvals, and operate \
                  the Rudder database from the command line.",
    after_help = "Examples:\n  rudder migrate\n  rudder turn --session s-1 --message \"pause my database main-db\"\n  rudder resume --correlation-id <id> --decision '{\"approve\": true, \"payload\": {}}'"
)]
pub struct Cli {
    /// Path to a TOML config file; environment overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one conversation turn and print the turn outcome")]
    Turn(commands::turn::TurnArgs),
    #[command(about = "Resolve a pending approval and print the resumed outcome")]
    Resume(commands::resume::ResumeArgs),
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
    #[command(about = "Validate config and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub(crate) fn init_logging(config: &AppConfig) {
    use rudder_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Turn(args) => commands::turn::run(config_path, args),
        Command::Resume(args) => commands::resume::run(config_path, args),
        Command::Migrate => commands::migrate::run(config_path),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(config_path, json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
