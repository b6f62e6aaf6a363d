//! Auto-sync functionality for CLI commands.
//!
//! Runs a full sync after write commands when `auto_sync` is enabled in the
//! configuration.

use sqlx::SqlitePool;
use tablesync_core::SyncDirection;

use super::client::{from_config, remote_from_config};
use crate::config::Config;

/// Performs auto-sync if enabled and the server is reachable.
///
/// Errors are reported on stderr and otherwise ignored; the CLI keeps working
/// offline.
pub async fn try_auto_sync(config: &Config, pool: &SqlitePool) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    // Check server reachability first (fast fail)
    let reachable = match remote_from_config(&config.sync) {
        Ok(remote) => remote.health().await.is_ok(),
        Err(_) => return,
    };
    if !reachable {
        eprintln!("Auto-sync: server unreachable, skipping");
        return;
    }

    let engine = match from_config(config, pool.clone()) {
        Ok(engine) => engine,
        Err(_) => return,
    };

    if let Err(e) = engine.sync(SyncDirection::Both).await {
        eprintln!("Auto-sync: {}", e);
    }
}
