pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "atende",
    about = "Atende operator CLI",
    long_about = "Operate the atende conversation engine: readiness, migrations, demo data, \
                  config inspection, slot lookups and one-shot conversations.",
    after_help = "Examples:\n  atende doctor --json\n  atende seed\n  \
                  atende slots --tenant escola-demo --date 2026-03-02\n  \
                  atende chat --tenant escola-demo --user 5511900000001 oi"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo tenant and verify it round-trips")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, collaborator settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List free appointment slots for a tenant on one date")]
    Slots {
        #[arg(long)]
        tenant: String,
        #[arg(long, help = "Date as YYYY-MM-DD")]
        date: String,
    },
    #[command(about = "Send one message through the conversation engine and print the replies")]
    Chat {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        user: String,
        #[arg(required = true, num_args = 1.., help = "Message text")]
        text: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Slots { tenant, date } => commands::slots::run(&tenant, &date),
        Command::Chat { tenant, user, text } => {
            commands::chat::run(&tenant, &user, &text.join(" "))
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
