use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod db;
mod models;
mod sync;

use commands::{ConfigCommand, RecordCommand, SyncCommand};
use config::Config;
use db::{init_db, RecordRepository};
use sync::try_auto_sync;

#[derive(Parser)]
#[command(name = "tsync")]
#[command(version)]
#[command(about = "Keep a local SQLite table in sync with a remote record store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, show, list and delete local records
    Record(RecordCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&config, cli_config_path),
        Commands::Record(cmd) => {
            let pool = init_db(&config.database_path.value).await?;
            let repo = RecordRepository::new(pool.clone(), config.table.value.as_str());
            cmd.run(&repo).await?;

            // Auto-sync AFTER write commands (only if command succeeded)
            if cmd.is_write() {
                try_auto_sync(&config, &pool).await;
            }
            Ok(())
        }
        Commands::Sync(cmd) => {
            let pool = init_db(&config.database_path.value).await?;
            cmd.run(&config, &pool).await?;
            Ok(())
        }
    }
}
