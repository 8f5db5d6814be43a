pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cassie",
    about = "Cassie support-agent operator CLI",
    long_about = "Run migrations, seed the knowledge base, inspect tickets, and chat with the \
                  assistant from a terminal.",
    after_help = "Examples:\n  cassie migrate\n  cassie seed\n  cassie chat --email you@example.com\n  cassie tickets --status open"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Interactive support chat against the local database")]
    Chat {
        #[arg(long, help = "Reuse a fixed session id instead of generating one")]
        session: Option<String>,
        #[arg(long, help = "Contact email passed with every turn")]
        email: Option<String>,
        #[arg(long, help = "Contact name passed with every turn")]
        name: Option<String>,
    },
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Seed the FAQ knowledge base and a few demo orders")]
    Seed,
    #[command(about = "List tickets, optionally filtered by status")]
    Tickets {
        #[arg(long, help = "open | in_progress | resolved | closed")]
        status: Option<String>,
    },
    #[command(about = "Validate config and database connectivity")]
    Doctor,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { session, email, name } => commands::chat::run(session, email, name),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Tickets { status } => commands::tickets::run(status),
        Command::Doctor => commands::doctor::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
