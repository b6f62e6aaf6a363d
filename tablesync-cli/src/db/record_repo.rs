use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tablesync_core::DirtyState;

use crate::models::LocalRecord;

/// Rows of one synchronized table.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
    table: String,
}

/// Number of rows waiting to be pushed, by flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.insert + self.update + self.delete
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    name: String,
    record_type: String,
    fields: String,
    dirty_state: String,
    modified_at: Option<String>,
    updated_at: String,
}

fn decode_error(name: &str, what: &str, detail: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("record '{}': invalid {}: {}", name, what, detail).into())
}

fn parse_time(name: &str, what: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| decode_error(name, what, e))
}

impl RecordRow {
    fn hydrate(self) -> Result<LocalRecord, sqlx::Error> {
        let fields: Map<String, Value> =
            serde_json::from_str(&self.fields).map_err(|e| decode_error(&self.name, "fields", e))?;
        let dirty_state = DirtyState::parse(&self.dirty_state)
            .ok_or_else(|| decode_error(&self.name, "dirty_state", &self.dirty_state))?;
        let modified_at = self
            .modified_at
            .as_deref()
            .map(|t| parse_time(&self.name, "modified_at", t))
            .transpose()?;
        let updated_at = parse_time(&self.name, "updated_at", &self.updated_at)?;

        Ok(LocalRecord {
            name: self.name,
            record_type: self.record_type,
            fields,
            dirty_state,
            modified_at,
            updated_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT name, record_type, fields, dirty_state, modified_at, updated_at FROM records";

impl RecordRepository {
    pub fn new(pool: SqlitePool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn get(&self, name: &str) -> Result<Option<LocalRecord>, sqlx::Error> {
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("{} WHERE table_name = ? AND name = ?", SELECT_COLUMNS))
                .bind(&self.table)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(RecordRow::hydrate).transpose()
    }

    /// Lists rows by name. Rows pending remote deletion are hidden unless asked for.
    pub async fn list(&self, include_deleted: bool) -> Result<Vec<LocalRecord>, sqlx::Error> {
        let sql = if include_deleted {
            format!("{} WHERE table_name = ? ORDER BY name", SELECT_COLUMNS)
        } else {
            format!(
                "{} WHERE table_name = ? AND dirty_state != 'delete' ORDER BY name",
                SELECT_COLUMNS
            )
        };
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(&self.table)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RecordRow::hydrate).collect()
    }

    pub async fn list_by_state(&self, states: &[DirtyState]) -> Result<Vec<LocalRecord>, sqlx::Error> {
        let mut records = Vec::new();
        for state in states {
            let rows: Vec<RecordRow> = sqlx::query_as(&format!(
                "{} WHERE table_name = ? AND dirty_state = ? ORDER BY name",
                SELECT_COLUMNS
            ))
            .bind(&self.table)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                records.push(row.hydrate()?);
            }
        }
        Ok(records)
    }

    /// Writes a local edit and flags the row for the next push.
    pub async fn save_local_edit(
        &self,
        name: &str,
        record_type: &str,
        fields: &Map<String, Value>,
    ) -> Result<LocalRecord, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let state = match self.current_state(&mut tx, name).await? {
            Some(existing) => existing.after_local_edit(),
            None => DirtyState::Insert,
        };
        let fields_json = serde_json::to_string(fields).unwrap_or_else(|_| "{}".to_string());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO records (table_name, name, record_type, fields, dirty_state, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(table_name, name) DO UPDATE SET
                record_type = excluded.record_type,
                fields = excluded.fields,
                dirty_state = excluded.dirty_state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.table)
        .bind(name)
        .bind(record_type)
        .bind(&fields_json)
        .bind(state.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(name).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Deletes a row locally.
    ///
    /// A row that was never pushed is removed outright; any other row is
    /// flagged for remote deletion. Returns false if the row does not exist.
    pub async fn delete_local(&self, name: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existed = match self.current_state(&mut tx, name).await? {
            None => false,
            Some(DirtyState::Insert) => {
                sqlx::query("DELETE FROM records WHERE table_name = ? AND name = ?")
                    .bind(&self.table)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                true
            }
            Some(_) => {
                sqlx::query(
                    "UPDATE records SET dirty_state = 'delete', updated_at = ? WHERE table_name = ? AND name = ?",
                )
                .bind(Utc::now().to_rfc3339())
                .bind(&self.table)
                .bind(name)
                .execute(&mut *tx)
                .await?;
                true
            }
        };

        tx.commit().await?;
        Ok(existed)
    }

    /// Clears flags of pushed rows and drops rows whose remote deletion succeeded.
    pub async fn mark_synced(
        &self,
        saved: &[(String, Option<DateTime<Utc>>)],
        deleted: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for (name, modified_at) in saved {
            sqlx::query(
                "UPDATE records SET dirty_state = 'not_needed', modified_at = ? WHERE table_name = ? AND name = ?",
            )
            .bind(modified_at.map(|t| t.to_rfc3339()))
            .bind(&self.table)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
        for name in deleted {
            sqlx::query("DELETE FROM records WHERE table_name = ? AND name = ?")
                .bind(&self.table)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }

    /// Applies remote changes in one transaction. Remote versions replace local rows.
    pub async fn apply_remote(
        &self,
        updated: &[LocalRecord],
        deleted: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for record in updated {
            let fields_json =
                serde_json::to_string(&record.fields).unwrap_or_else(|_| "{}".to_string());
            sqlx::query(
                r#"
                INSERT INTO records (table_name, name, record_type, fields, dirty_state, modified_at, updated_at)
                VALUES (?, ?, ?, ?, 'not_needed', ?, ?)
                ON CONFLICT(table_name, name) DO UPDATE SET
                    record_type = excluded.record_type,
                    fields = excluded.fields,
                    dirty_state = 'not_needed',
                    modified_at = excluded.modified_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.table)
            .bind(&record.name)
            .bind(&record.record_type)
            .bind(&fields_json)
            .bind(record.modified_at.map(|t| t.to_rfc3339()))
            .bind(record.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        for name in deleted {
            sqlx::query("DELETE FROM records WHERE table_name = ? AND name = ?")
                .bind(&self.table)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }

    /// Deletes every row of the table.
    pub async fn delete_all(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM records WHERE table_name = ?")
            .bind(&self.table)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn pending_counts(&self) -> Result<PendingCounts, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT dirty_state, COUNT(*) FROM records WHERE table_name = ? GROUP BY dirty_state",
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = PendingCounts::default();
        for (state, count) in rows {
            let count = count as usize;
            match DirtyState::parse(&state) {
                Some(DirtyState::Insert) => counts.insert = count,
                Some(DirtyState::Update) => counts.update = count,
                Some(DirtyState::Delete) => counts.delete = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn current_state(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
    ) -> Result<Option<DirtyState>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT dirty_state FROM records WHERE table_name = ? AND name = ?")
                .bind(&self.table)
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(|(state,)| {
            DirtyState::parse(&state).ok_or_else(|| decode_error(name, "dirty_state", &state))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (RecordRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (RecordRepository::new(pool, "notes"), temp_dir)
    }

    fn fields(title: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("title".to_string(), json!(title));
        map
    }

    #[tokio::test]
    async fn test_new_record_is_insert() {
        let (repo, _temp) = setup().await;

        let record = repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();

        assert_eq!(record.dirty_state, DirtyState::Insert);
        assert_eq!(record.fields["title"], "one");
        assert_eq!(repo.get("a").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_edit_of_unsynced_insert_stays_insert() {
        let (repo, _temp) = setup().await;
        repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();

        let record = repo.save_local_edit("a", "Note", &fields("two")).await.unwrap();

        assert_eq!(record.dirty_state, DirtyState::Insert);
        assert_eq!(record.fields["title"], "two");
    }

    #[tokio::test]
    async fn test_edit_of_synced_row_is_update() {
        let (repo, _temp) = setup().await;
        repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();
        repo.mark_synced(&[("a".to_string(), Some(Utc::now()))], &[])
            .await
            .unwrap();

        let record = repo.save_local_edit("a", "Note", &fields("two")).await.unwrap();

        assert_eq!(record.dirty_state, DirtyState::Update);
        assert!(record.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_unsynced_insert_removes_row() {
        let (repo, _temp) = setup().await;
        repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();

        assert!(repo.delete_local("a").await.unwrap());

        assert_eq!(repo.get("a").await.unwrap(), None);
        assert!(!repo.delete_local("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_synced_row_flags_delete() {
        let (repo, _temp) = setup().await;
        repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();
        repo.mark_synced(&[("a".to_string(), None)], &[]).await.unwrap();

        repo.delete_local("a").await.unwrap();

        let record = repo.get("a").await.unwrap().unwrap();
        assert_eq!(record.dirty_state, DirtyState::Delete);
        assert!(repo.list(false).await.unwrap().is_empty());
        assert_eq!(repo.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_remote_replaces_and_deletes() {
        let (repo, _temp) = setup().await;
        repo.save_local_edit("a", "Note", &fields("local")).await.unwrap();
        repo.save_local_edit("b", "Note", &fields("gone")).await.unwrap();

        let remote = LocalRecord {
            name: "a".to_string(),
            record_type: "Note".to_string(),
            fields: fields("remote"),
            dirty_state: DirtyState::NotNeeded,
            modified_at: Some(Utc::now()),
            updated_at: Utc::now(),
        };
        repo.apply_remote(&[remote], &["b".to_string()]).await.unwrap();

        let a = repo.get("a").await.unwrap().unwrap();
        assert_eq!(a.fields["title"], "remote");
        assert_eq!(a.dirty_state, DirtyState::NotNeeded);
        assert_eq!(repo.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_counts_and_tables_are_isolated() {
        let (repo, _temp) = setup().await;
        let other = RecordRepository::new(repo.pool.clone(), "tasks");
        repo.save_local_edit("a", "Note", &fields("one")).await.unwrap();
        repo.save_local_edit("b", "Note", &fields("two")).await.unwrap();
        repo.mark_synced(&[("b".to_string(), None)], &[]).await.unwrap();
        repo.delete_local("b").await.unwrap();
        other.save_local_edit("x", "Task", &fields("three")).await.unwrap();

        let counts = repo.pending_counts().await.unwrap();
        assert_eq!(
            counts,
            PendingCounts {
                insert: 1,
                update: 0,
                delete: 1
            }
        );
        assert_eq!(counts.total(), 2);

        assert_eq!(repo.delete_all().await.unwrap(), 2);
        assert_eq!(other.list(true).await.unwrap().len(), 1);
    }
}
