//! Change tokens kept in the `settings` table.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tablesync_core::{ChangeToken, TokenStore, TokenStoreError};

fn backend_error(e: sqlx::Error) -> TokenStoreError {
    TokenStoreError::Backend(e.to_string())
}

#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn load(&self, key: &str) -> Result<Option<ChangeToken>, TokenStoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(row.map(|(value,)| ChangeToken::new(value)))
    }

    async fn save(&self, key: &str, token: &ChangeToken) -> Result<(), TokenStoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(token.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
