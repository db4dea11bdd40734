//! Vocalis CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a starter config
//! - `agent`   — Interactive session or single utterance
//! - `recall`  — Print a session's stored chat window
//! - `clear`   — Delete a session's chat window and attributes
//! - `learn`   — Add a fact to the shared knowledge base

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "vocalis",
    about = "Vocalis — voice assistant context engine with memory and reminders",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

/// Who the session belongs to.
#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    /// Session id the chat window is stored under
    #[arg(long, env = "VOCALIS_SESSION", default_value = "cli")]
    pub session: String,

    /// User id for long-term memories
    #[arg(long, env = "VOCALIS_USER", default_value = "local-user")]
    pub user: String,

    /// Name the assistant addresses the user by
    #[arg(long)]
    pub name: Option<String>,

    /// IANA time zone, e.g. Europe/Paris (defaults to the configured one)
    #[arg(long)]
    pub tz: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Onboard,

    /// Talk to the assistant
    Agent {
        /// Send a single utterance instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show the stored chat window of a session
    Recall {
        #[arg(long, env = "VOCALIS_SESSION", default_value = "cli")]
        session: String,
    },

    /// Delete the stored chat window and attributes of a session
    Clear {
        #[arg(long, env = "VOCALIS_SESSION", default_value = "cli")]
        session: String,
    },

    /// Add a fact to the knowledge base
    Learn {
        /// The fact to store
        fact: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent { message, session } => commands::agent::run(message, session).await?,
        Commands::Recall { session } => commands::session::recall(&session).await?,
        Commands::Clear { session } => commands::session::clear(&session).await?,
        Commands::Learn { fact } => commands::knowledge::learn(&fact).await?,
    }

    Ok(())
}
