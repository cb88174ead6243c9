//! Scout main binary.

mod config;
mod memory;
mod orchestrator;
mod routes;
mod sanitize;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scout", version, about = "Scout job-hunting assistant")]
struct Cli {
    /// Path to scout.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the Scout server (default).
    Serve,
    /// Validate config and storage, then exit.
    Doctor,
    /// Record a grounding fact for a user.
    SeedMemory { user_id: String, fact: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    match command {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::SeedMemory { user_id, fact } => {
            server::seed_memory(cli.config, &user_id, &fact).await
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,scout=debug,scout_app=debug,scout_llm=debug,scout_tools=debug,scout_store=debug,tower_http=info")
    });
    let log_format = std::env::var("SCOUT_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }
}
