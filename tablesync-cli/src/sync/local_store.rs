//! SQLite-backed local side of the sync engine.

use async_trait::async_trait;
use chrono::Utc;
use tablesync_core::{
    DirtyState, LocalStore, LocalStoreError, RecordId, RemoteRecord, ZoneId,
};
use tracing::debug;

use crate::db::RecordRepository;
use crate::models::LocalRecord;

fn storage_error(e: sqlx::Error) -> LocalStoreError {
    LocalStoreError::Storage(e.to_string())
}

/// Exposes one table of the local database to the engine.
///
/// The table name doubles as the remote zone name.
pub struct SqliteLocalStore {
    repo: RecordRepository,
    zone: ZoneId,
}

impl SqliteLocalStore {
    pub fn new(repo: RecordRepository) -> Self {
        let zone = ZoneId::new(repo.table());
        Self { repo, zone }
    }

    pub fn repo(&self) -> &RecordRepository {
        &self.repo
    }

    /// Settings key prefix for a table's change tokens.
    pub fn token_key(table: &str) -> String {
        format!("tsync.{}", table)
    }

    fn owned_name<'a>(&self, id: &'a RecordId) -> Result<&'a str, LocalStoreError> {
        if id.zone != self.zone {
            return Err(LocalStoreError::InvalidRecord(
                id.to_string(),
                format!("not in zone {}", self.zone),
            ));
        }
        Ok(&id.name)
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    fn zone_id(&self) -> ZoneId {
        self.zone.clone()
    }

    fn change_token_key(&self) -> String {
        Self::token_key(self.repo.table())
    }

    async fn records_to_update_remotely(&self) -> Result<Vec<RemoteRecord>, LocalStoreError> {
        let records = self
            .repo
            .list_by_state(&[DirtyState::Insert, DirtyState::Update])
            .await
            .map_err(storage_error)?;
        Ok(records.iter().map(|r| r.to_remote(&self.zone)).collect())
    }

    async fn record_ids_to_delete_remotely(&self) -> Result<Vec<RecordId>, LocalStoreError> {
        let records = self
            .repo
            .list_by_state(&[DirtyState::Delete])
            .await
            .map_err(storage_error)?;
        Ok(records
            .into_iter()
            .map(|r| RecordId::new(self.zone.clone(), r.name))
            .collect())
    }

    async fn mark_synced(
        &self,
        saved: &[RemoteRecord],
        deleted: &[RecordId],
    ) -> Result<(), LocalStoreError> {
        let saved = saved
            .iter()
            .map(|r| Ok((self.owned_name(&r.id)?.to_string(), r.modified_at)))
            .collect::<Result<Vec<_>, LocalStoreError>>()?;
        let deleted = deleted
            .iter()
            .map(|id| self.owned_name(id).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(zone = %self.zone, saved = saved.len(), deleted = deleted.len(), "marking rows synced");
        self.repo
            .mark_synced(&saved, &deleted)
            .await
            .map_err(storage_error)
    }

    async fn apply_remote_changes(
        &self,
        updated: Vec<RemoteRecord>,
        deleted: Vec<RecordId>,
    ) -> Result<(), LocalStoreError> {
        let now = Utc::now();
        let mut rows = Vec::with_capacity(updated.len());
        for record in updated {
            let name = self.owned_name(&record.id)?.to_string();
            rows.push(LocalRecord {
                name,
                record_type: record.record_type,
                fields: record.fields,
                dirty_state: DirtyState::NotNeeded,
                modified_at: record.modified_at,
                updated_at: now,
            });
        }
        let deleted = deleted
            .iter()
            .map(|id| self.owned_name(id).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        self.repo
            .apply_remote(&rows, &deleted)
            .await
            .map_err(storage_error)
    }

    async fn delete_all(&self) -> Result<(), LocalStoreError> {
        let removed = self.repo.delete_all().await.map_err(storage_error)?;
        debug!(zone = %self.zone, removed, "cleared local table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    async fn setup() -> (SqliteLocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (
            SqliteLocalStore::new(RecordRepository::new(pool, "notes")),
            temp_dir,
        )
    }

    fn fields(title: &str) -> Map<String, serde_json::Value> {
        let mut map = Map::new();
        map.insert("title".to_string(), json!(title));
        map
    }

    #[tokio::test]
    async fn test_dirty_rows_shaped_for_remote() {
        let (store, _temp) = setup().await;
        store.repo().save_local_edit("a", "Note", &fields("one")).await.unwrap();
        store.repo().save_local_edit("b", "Note", &fields("two")).await.unwrap();
        store
            .repo()
            .mark_synced(&[("b".to_string(), None)], &[])
            .await
            .unwrap();
        store.repo().delete_local("b").await.unwrap();

        let saves = store.records_to_update_remotely().await.unwrap();
        let deletes = store.record_ids_to_delete_remotely().await.unwrap();

        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].id, RecordId::new(ZoneId::new("notes"), "a"));
        assert_eq!(deletes, vec![RecordId::new(ZoneId::new("notes"), "b")]);
    }

    #[tokio::test]
    async fn test_mark_synced_rejects_foreign_zone() {
        let (store, _temp) = setup().await;
        let foreign = RemoteRecord::new(RecordId::new(ZoneId::new("tasks"), "a"), "Task");

        let err = store.mark_synced(&[foreign], &[]).await.unwrap_err();
        assert!(matches!(err, LocalStoreError::InvalidRecord(_, _)));
    }

    #[tokio::test]
    async fn test_apply_remote_changes_and_delete_all() {
        let (store, _temp) = setup().await;
        let zone = store.zone_id();
        let record = RemoteRecord::new(RecordId::new(zone.clone(), "a"), "Note")
            .with_field("title", "remote");

        store.apply_remote_changes(vec![record], vec![]).await.unwrap();
        let row = store.repo().get("a").await.unwrap().unwrap();
        assert_eq!(row.dirty_state, DirtyState::NotNeeded);
        assert_eq!(row.fields["title"], "remote");

        store.delete_all().await.unwrap();
        assert!(store.repo().list(true).await.unwrap().is_empty());
    }

    #[test]
    fn test_token_key() {
        assert_eq!(SqliteLocalStore::token_key("notes"), "tsync.notes");
    }
}
