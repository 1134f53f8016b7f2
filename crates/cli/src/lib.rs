pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "opsboard",
    about = "Opsboard operator CLI",
    long_about = "Operate the incident dashboard database: migrations, seed data, and readiness checks.",
    after_help = "Examples:\n  opsboard migrate\n  opsboard seed --demo\n  opsboard doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the classification reference data (idempotent)")]
    Seed {
        #[arg(long, help = "Also load deterministic demo incidents")]
        demo: bool,
    },
    #[command(about = "Validate configuration, database connectivity, and seed completeness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { demo } => commands::seed::run(demo),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
