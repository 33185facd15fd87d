mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use weirwood::config::WeirwoodConfig;

#[derive(Parser)]
#[command(name = "weirwood", version, about = "Chat server with short- and long-term memory")]
struct Cli {
    /// Config file (defaults to ~/.weirwood/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Check the database and print a health report
    Doctor,
    /// Show row counts for users, chats, messages, and memories
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WeirwoodConfig::load_from(path)?,
        None => WeirwoodConfig::load()?,
    };

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => weirwood::server::serve(config).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Stats => cli::stats::stats(&config)?,
    }

    Ok(())
}
