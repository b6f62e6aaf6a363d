//! Builds the sync engine for the configured table.

use std::sync::Arc;

use sqlx::SqlitePool;
use tablesync_core::{HttpRemote, RemoteStore, SyncOptions, TableSync};

use super::{SqliteLocalStore, SqliteTokenStore};
use crate::config::{Config, SyncConfig};
use crate::db::RecordRepository;

/// Errors that can occur while setting up sync.
#[derive(Debug)]
pub enum SyncClientError {
    /// Sync is not configured
    NotConfigured,
}

impl std::fmt::Display for SyncClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncClientError::NotConfigured => write!(
                f,
                "Sync not configured. Add server_url and api_key to config."
            ),
        }
    }
}

impl std::error::Error for SyncClientError {}

/// Creates the HTTP remote from config.
pub fn remote_from_config(config: &SyncConfig) -> Result<HttpRemote, SyncClientError> {
    let server_url = config
        .server_url
        .clone()
        .ok_or(SyncClientError::NotConfigured)?;
    let api_key = config
        .api_key
        .clone()
        .ok_or(SyncClientError::NotConfigured)?;
    Ok(HttpRemote::new(server_url, api_key))
}

/// Wires a table of the local database to `remote`.
pub fn table_sync<R: RemoteStore + 'static>(
    pool: SqlitePool,
    table: &str,
    remote: Arc<R>,
    options: SyncOptions,
) -> TableSync<SqliteLocalStore, R> {
    let local = SqliteLocalStore::new(RecordRepository::new(pool.clone(), table));
    TableSync::with_options(
        Arc::new(local),
        remote,
        Arc::new(SqliteTokenStore::new(pool)),
        options,
    )
}

/// Sync engine for the configured table and server.
pub fn from_config(
    config: &Config,
    pool: SqlitePool,
) -> Result<TableSync<SqliteLocalStore, HttpRemote>, SyncClientError> {
    let remote = remote_from_config(&config.sync)?;
    Ok(table_sync(
        pool,
        &config.table.value,
        Arc::new(remote),
        SyncOptions {
            probe_timeout: config.sync.probe_timeout(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::{json, Map};
    use tablesync_core::{DirtyState, MemoryRemote, SyncDirection};
    use tempfile::TempDir;

    async fn device(temp: &TempDir, name: &str, remote: &MemoryRemote) -> TableSync<SqliteLocalStore, MemoryRemote> {
        let pool = init_db(&temp.path().join(format!("{}.db", name))).await.unwrap();
        table_sync(pool, "notes", Arc::new(remote.clone()), SyncOptions::default())
    }

    fn fields(title: &str) -> Map<String, serde_json::Value> {
        let mut map = Map::new();
        map.insert("title".to_string(), json!(title));
        map
    }

    #[test]
    fn test_remote_requires_url_and_key() {
        let config = SyncConfig {
            server_url: Some("http://localhost:8080".to_string()),
            ..SyncConfig::default()
        };
        assert!(matches!(
            remote_from_config(&config),
            Err(SyncClientError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_two_devices_converge() {
        let temp = TempDir::new().unwrap();
        let remote = MemoryRemote::new();
        let laptop = device(&temp, "laptop", &remote).await;
        let phone = device(&temp, "phone", &remote).await;

        let repo = laptop.local().repo();
        repo.save_local_edit("a", "Note", &fields("from laptop")).await.unwrap();
        laptop.sync(SyncDirection::Both).await.unwrap();

        let report = phone.sync(SyncDirection::Both).await.unwrap();
        assert_eq!(report.pulled.updated, 1);
        let row = phone.local().repo().get("a").await.unwrap().unwrap();
        assert_eq!(row.fields["title"], "from laptop");
        assert_eq!(row.dirty_state, DirtyState::NotNeeded);

        phone.local().repo().delete_local("a").await.unwrap();
        phone.sync(SyncDirection::Both).await.unwrap();
        laptop.sync(SyncDirection::FromRemote).await.unwrap();

        assert_eq!(laptop.local().repo().get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_token_rebuilds_local_table() {
        let temp = TempDir::new().unwrap();
        let remote = MemoryRemote::new();
        let laptop = device(&temp, "laptop", &remote).await;
        laptop
            .local()
            .repo()
            .save_local_edit("a", "Note", &fields("one"))
            .await
            .unwrap();
        laptop.sync(SyncDirection::Both).await.unwrap();

        remote.with_journal(|j| j.reset());
        let report = laptop.sync(SyncDirection::FromRemote).await.unwrap();

        assert!(report.pulled.token_reset);
        let rows = laptop.local().repo().list(true).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["title"], "one");
    }
}
