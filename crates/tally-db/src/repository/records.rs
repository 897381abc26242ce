//! # Record Repository
//!
//! SQL for the four collection tables. All tables share one column layout, so
//! one repository serves every [`Collection`]; the table name comes from
//! [`Collection::table_name`] and is never user input.
//!
//! ## Merge-on-Pull
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    merge_remote (SINGLE TRANSACTION)                    │
//! │                                                                         │
//! │  1. take the write lock                                                │
//! │  2. SELECT rows WHERE uuid = remote.uuid OR local_id = remote.local_id │
//! │       │                                                                 │
//! │       ├── any row dirty?  ──► ROLLBACK, SkippedDirty (local wins)       │
//! │       │                                                                 │
//! │  3. DELETE matching rows keyed by a different local_id                 │
//! │     (record created offline under its uuid, now known by server id)   │
//! │  4. UPSERT remote copy with is_dirty = 0, sync_status = 'synced'       │
//! │  5. COMMIT                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Value};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::MergeOutcome;
use tally_core::{Collection, Record, SyncStatus};

const COLUMNS: &str = "local_id, uuid, business_id, is_dirty, sync_status, last_updated, fields";

/// Raw row shape shared by every collection table.
#[derive(Debug, FromRow)]
struct RecordRow {
    local_id: String,
    uuid: String,
    business_id: String,
    is_dirty: bool,
    sync_status: String,
    last_updated: i64,
    fields: String,
}

impl RecordRow {
    fn into_record(self) -> DbResult<Record> {
        let fields: Map<String, Value> = serde_json::from_str(&self.fields)?;

        Ok(Record {
            local_id: self.local_id,
            uuid: self.uuid,
            business_id: self.business_id,
            is_dirty: self.is_dirty,
            sync_status: self.sync_status.parse::<SyncStatus>()?,
            last_updated: self.last_updated,
            fields,
        })
    }
}

fn into_records(rows: Vec<RecordRow>) -> DbResult<Vec<Record>> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

/// Repository for the per-collection record tables.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    pub async fn get_all(&self, collection: Collection) -> DbResult<Vec<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY last_updated ASC",
            collection.table_name()
        );

        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        into_records(rows)
    }

    /// Dirty records, oldest edit first.
    ///
    /// `is_dirty = 1` matches the partial index predicate, so only dirty rows
    /// are visited.
    pub async fn get_dirty(&self, collection: Collection) -> DbResult<Vec<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE is_dirty = 1 ORDER BY last_updated ASC",
            collection.table_name()
        );

        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        into_records(rows)
    }

    pub async fn get_by_uuid(&self, collection: Collection, uuid: &str) -> DbResult<Option<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE uuid = ?1",
            collection.table_name()
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RecordRow::into_record).transpose()
    }

    pub async fn get(&self, collection: Collection, local_id: &str) -> DbResult<Option<Record>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE local_id = ?1",
            collection.table_name()
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RecordRow::into_record).transpose()
    }

    /// Upserts a record keyed by `local_id`.
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - the uuid already belongs to a different
    ///   local id
    pub async fn put(&self, collection: Collection, record: &Record) -> DbResult<()> {
        debug!(
            collection = %collection,
            local_id = %record.local_id,
            is_dirty = record.is_dirty,
            "Putting record"
        );

        let fields = serde_json::to_string(&record.fields)?;
        sqlx::query(&upsert_sql(collection))
            .bind(&record.local_id)
            .bind(&record.uuid)
            .bind(&record.business_id)
            .bind(record.is_dirty)
            .bind(record.sync_status.as_str())
            .bind(record.last_updated)
            .bind(fields)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete(&self, collection: Collection, local_id: &str) -> DbResult<bool> {
        let sql = format!("DELETE FROM {} WHERE local_id = ?1", collection.table_name());

        let result = sqlx::query(&sql).bind(local_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_dirty(&self, collection: Collection) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE is_dirty = 1",
            collection.table_name()
        );

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn max_last_updated(&self, collection: Collection) -> DbResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(last_updated), 0) FROM {}",
            collection.table_name()
        );

        let max: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(max)
    }

    /// Compare-and-clear of the dirty flag.
    ///
    /// ## Arguments
    /// * `last_updated` - The value the pushed snapshot carried
    ///
    /// ## Returns
    /// * `true` - Row cleared
    /// * `false` - Row was edited again, deleted, or already clean
    pub async fn mark_synced(
        &self,
        collection: Collection,
        local_id: &str,
        last_updated: i64,
    ) -> DbResult<bool> {
        let sql = format!(
            r#"
            UPDATE {} SET
                is_dirty = 0,
                sync_status = 'synced'
            WHERE local_id = ?1 AND last_updated = ?2 AND is_dirty = 1
            "#,
            collection.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(local_id)
            .bind(last_updated)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Applies a pulled record with the dirty-local-wins rule.
    pub async fn merge_remote(
        &self,
        collection: Collection,
        record: &Record,
    ) -> DbResult<MergeOutcome> {
        let table = collection.table_name();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        // A no-op write takes the write lock before the dirty check reads.
        sqlx::query(&format!("UPDATE {table} SET is_dirty = is_dirty WHERE 0"))
            .execute(&mut *tx)
            .await?;

        let existing: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM {table} WHERE uuid = ?1 OR local_id = ?2"
        ))
        .bind(&record.uuid)
        .bind(&record.local_id)
        .fetch_all(&mut *tx)
        .await?;

        if existing.iter().any(|row| row.is_dirty) {
            tx.rollback()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

            debug!(
                collection = %collection,
                uuid = %record.uuid,
                "Local copy is dirty, skipping pulled record"
            );
            return Ok(MergeOutcome::SkippedDirty);
        }

        for stale in existing.iter().filter(|row| row.local_id != record.local_id) {
            debug!(
                collection = %collection,
                old_local_id = %stale.local_id,
                new_local_id = %record.local_id,
                "Re-keying record to server id"
            );
            sqlx::query(&format!("DELETE FROM {table} WHERE local_id = ?1"))
                .bind(&stale.local_id)
                .execute(&mut *tx)
                .await?;
        }

        upsert_clean(&mut tx, collection, record).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(if existing.is_empty() {
            MergeOutcome::Inserted
        } else {
            MergeOutcome::Updated
        })
    }
}

fn upsert_sql(collection: Collection) -> String {
    format!(
        r#"
        INSERT INTO {} ({COLUMNS})
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(local_id) DO UPDATE SET
            uuid = excluded.uuid,
            business_id = excluded.business_id,
            is_dirty = excluded.is_dirty,
            sync_status = excluded.sync_status,
            last_updated = excluded.last_updated,
            fields = excluded.fields
        "#,
        collection.table_name()
    )
}

/// Upserts a record as synced inside an open transaction.
async fn upsert_clean(
    tx: &mut Transaction<'_, Sqlite>,
    collection: Collection,
    record: &Record,
) -> DbResult<()> {
    let fields = serde_json::to_string(&record.fields)?;

    sqlx::query(&upsert_sql(collection))
        .bind(&record.local_id)
        .bind(&record.uuid)
        .bind(&record.business_id)
        .bind(false)
        .bind(SyncStatus::Synced.as_str())
        .bind(record.last_updated)
        .bind(fields)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
