//! tablesync server
//!
//! Reference remote record store for tablesync clients. Records are kept in
//! one change-token journal per group.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TABLESYNC_PORT`: Port to listen on (default: 8080)
//! - `TABLESYNC_DATA_DIR`: Directory to store journals (default: ~/.local/share/tablesync-server)
//! - `TABLESYNC_CONFIG`: Path to config file (default: ~/.config/tablesync-server/config.yaml)
//! - `TABLESYNC_PAGE_SIZE`: Records per zone change page (default: 200)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//!     group_id: "family1"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod admin;
mod config;
mod server;

use admin::AdminCommand;
use config::ServerConfig;
use server::{router, ApiKeyStore, AppState, JournalStore};

#[derive(Parser)]
#[command(name = "tablesync-server")]
#[command(version)]
#[command(about = "Record store server for tablesync clients", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, short, global = true)]
    port: Option<u16>,

    /// Directory to store journals
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to the API key config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Maintain journals offline (stop the server first)
    Admin(AdminCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ServerConfig::from_env().with_overrides(cli.port, cli.data_dir, cli.config);

    match cli.command {
        Some(Commands::Admin(cmd)) => {
            let store = JournalStore::with_page_size(&config.data_dir, config.page_size);
            cmd.run(&store)
        }
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablesync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::fs::create_dir_all(&config.data_dir)?;

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState {
        api_keys: Arc::new(ApiKeyStore::load(&config.config_path)),
        store: Arc::new(JournalStore::with_page_size(
            &config.data_dir,
            config.page_size,
        )),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
