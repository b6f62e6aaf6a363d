//! Sync CLI commands for synchronizing with the server.

use std::sync::Arc;

use clap::{Args, Subcommand, ValueEnum};
use sqlx::SqlitePool;
use tablesync_core::{ChangeTokens, SyncDirection, SyncError, SyncReport, TokenStoreError};

use crate::config::Config;
use crate::db::RecordRepository;
use crate::sync::client::{from_config, remote_from_config};
use crate::sync::{SqliteLocalStore, SqliteTokenStore, SyncClientError};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum DirectionArg {
    /// Push local changes only
    ToRemote,
    /// Pull remote changes only
    FromRemote,
    /// Push, then pull
    #[default]
    Both,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::ToRemote => SyncDirection::ToRemote,
            DirectionArg::FromRemote => SyncDirection::FromRemote,
            DirectionArg::Both => SyncDirection::Both,
        }
    }
}

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Which way to sync
    #[arg(long, short, value_enum, default_value = "both")]
    direction: DirectionArg,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,

    /// Forget change tokens and local rows so the next sync starts over
    Reset {
        /// Discard unsynced local changes
        #[arg(long)]
        force: bool,
    },
}

impl SyncCommand {
    pub async fn run(&self, config: &Config, pool: &SqlitePool) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(config, pool).await,
            Some(SyncSubcommand::Status) => self.status(config, pool).await,
            Some(SyncSubcommand::Reset { force }) => self.reset(config, pool, *force).await,
        }
    }

    async fn sync(&self, config: &Config, pool: &SqlitePool) -> Result<(), SyncCommandError> {
        let engine = from_config(config, pool.clone())?;
        let direction = SyncDirection::from(self.direction);

        println!("Syncing table '{}' ({})...", config.table.value, direction);
        let report = engine.sync(direction).await?;
        print_report(&report);
        Ok(())
    }

    async fn status(&self, config: &Config, pool: &SqlitePool) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let repo = RecordRepository::new(pool.clone(), config.table.value.as_str());
        let pending = repo.pending_counts().await?;
        let tokens = change_tokens(pool, &config.table.value);
        let has_token = tokens.database().await?.is_some();

        println!("Table:     {}", config.table.value);
        println!(
            "Pending:   {} insert, {} update, {} delete",
            pending.insert, pending.update, pending.delete
        );
        println!(
            "Synced:    {}",
            if has_token { "yes" } else { "never" }
        );
        println!();

        let remote = match remote_from_config(&config.sync) {
            Ok(remote) => remote,
            Err(SyncClientError::NotConfigured) => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  TSYNC_SYNC_URL");
                println!("  TSYNC_SYNC_API_KEY");
                return Ok(());
            }
        };

        println!("Server:    {}", remote.server_url());
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        match remote.health().await {
            Ok(()) => println!("Server status: ✓ connected"),
            Err(e) => println!("Server status: ✗ {}", e),
        }

        Ok(())
    }

    async fn reset(
        &self,
        config: &Config,
        pool: &SqlitePool,
        force: bool,
    ) -> Result<(), SyncCommandError> {
        let repo = RecordRepository::new(pool.clone(), config.table.value.as_str());
        let pending = repo.pending_counts().await?.total();
        if pending > 0 && !force {
            return Err(SyncCommandError::PendingChanges(pending));
        }

        let removed = repo.delete_all().await?;
        change_tokens(pool, &config.table.value).clear().await?;

        println!(
            "Reset table '{}': removed {} local record(s).",
            config.table.value, removed
        );
        println!("The next sync downloads everything again.");
        Ok(())
    }
}

fn change_tokens(pool: &SqlitePool, table: &str) -> ChangeTokens {
    ChangeTokens::new(
        Arc::new(SqliteTokenStore::new(pool.clone())),
        &SqliteLocalStore::token_key(table),
    )
}

fn print_report(report: &SyncReport) {
    if report.direction.pushes() {
        let pushed = report.pushed.saved + report.pushed.deleted;
        if pushed == 0 {
            println!("  ✓ nothing to push");
        } else {
            println!(
                "  ✓ pushed {} saved, {} deleted",
                report.pushed.saved, report.pushed.deleted
            );
        }
    }
    if report.direction.pulls() {
        if report.pulled.token_reset {
            println!("  ! change history expired, local table rebuilt");
        }
        if report.pulled.zone_changed {
            println!(
                "  ✓ pulled {} updated, {} deleted",
                report.pulled.updated, report.pulled.deleted
            );
        } else {
            println!("  ✓ already up to date");
        }
    }
    println!();
    println!("Sync complete.");
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    ClientError(SyncClientError),
    SyncError(SyncError),
    DatabaseError(sqlx::Error),
    TokenError(TokenStoreError),
    PendingChanges(usize),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::ClientError(e) => write!(f, "{}", e),
            SyncCommandError::SyncError(e) => write!(f, "Sync failed: {}", e),
            SyncCommandError::DatabaseError(e) => write!(f, "Database error: {}", e),
            SyncCommandError::TokenError(e) => write!(f, "Change token error: {}", e),
            SyncCommandError::PendingChanges(n) => write!(
                f,
                "{} local change(s) not yet synced. Sync first or pass --force.",
                n
            ),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::ClientError(e) => Some(e),
            SyncCommandError::SyncError(e) => Some(e),
            SyncCommandError::DatabaseError(e) => Some(e),
            SyncCommandError::TokenError(e) => Some(e),
            SyncCommandError::PendingChanges(_) => None,
        }
    }
}

impl From<SyncClientError> for SyncCommandError {
    fn from(e: SyncClientError) -> Self {
        SyncCommandError::ClientError(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}

impl From<sqlx::Error> for SyncCommandError {
    fn from(e: sqlx::Error) -> Self {
        SyncCommandError::DatabaseError(e)
    }
}

impl From<TokenStoreError> for SyncCommandError {
    fn from(e: TokenStoreError) -> Self {
        SyncCommandError::TokenError(e)
    }
}
