//! # LocalStore
//!
//! The storage seam the sync engine is written against.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LocalStore                                      │
//! │                                                                         │
//! │  Records (per Collection)              Config (key/value)              │
//! │  ────────────────────────              ──────────────────              │
//! │  get_all      every record             get_config(key)                 │
//! │  get_dirty    dirty index scan         set_config(key, value)          │
//! │  get_by_uuid  uuid lookup                                              │
//! │  get          local_id lookup                                          │
//! │  put          upsert by local_id                                       │
//! │  delete       remove by local_id                                       │
//! │  count_dirty  pending statistic                                        │
//! │  mark_synced  compare-and-clear after a push ack                       │
//! │  merge_remote dirty-wins upsert of a pulled record                     │
//! │                                                                         │
//! │  Every error is a DbError; callers must not assume success.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use tally_core::{Collection, Record};

use crate::error::DbResult;

/// What `merge_remote` did with a pulled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No local copy existed; the remote record was inserted.
    Inserted,
    /// A clean local copy was overwritten.
    Updated,
    /// The local copy is dirty and was left untouched.
    SkippedDirty,
}

impl MergeOutcome {
    /// True if the store changed.
    pub fn is_applied(&self) -> bool {
        !matches!(self, MergeOutcome::SkippedDirty)
    }
}

/// Durable keyed record store with a dirty index and a config table.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All records in a collection, any dirty state.
    async fn get_all(&self, collection: Collection) -> DbResult<Vec<Record>>;

    /// Records with `is_dirty = true`, read through the dirty index.
    async fn get_dirty(&self, collection: Collection) -> DbResult<Vec<Record>>;

    /// Lookup by immutable uuid.
    async fn get_by_uuid(&self, collection: Collection, uuid: &str) -> DbResult<Option<Record>>;

    /// Lookup by local primary key.
    async fn get(&self, collection: Collection, local_id: &str) -> DbResult<Option<Record>>;

    /// Upsert keyed by `local_id`. The dirty index is updated in the same write.
    async fn put(&self, collection: Collection, record: &Record) -> DbResult<()>;

    /// Removes a record. Returns false if nothing was deleted.
    async fn delete(&self, collection: Collection, local_id: &str) -> DbResult<bool>;

    /// Number of dirty records in a collection.
    async fn count_dirty(&self, collection: Collection) -> DbResult<u64>;

    /// Highest `last_updated` stored in a collection, 0 when empty.
    async fn max_last_updated(&self, collection: Collection) -> DbResult<i64>;

    /// Clears the dirty flag only if the row still carries `last_updated`.
    ///
    /// Returns false when a newer local edit (or a delete) happened after the
    /// pushed snapshot was read; that row stays dirty for the next push.
    async fn mark_synced(
        &self,
        collection: Collection,
        local_id: &str,
        last_updated: i64,
    ) -> DbResult<bool>;

    /// Applies a pulled record unless the local copy is dirty.
    ///
    /// Lookup, stale-row removal and upsert happen in one transaction, so a
    /// local edit cannot slip in between the dirty check and the write.
    async fn merge_remote(&self, collection: Collection, record: &Record)
        -> DbResult<MergeOutcome>;

    /// Reads a config value.
    async fn get_config(&self, key: &str) -> DbResult<Option<String>>;

    /// Writes a config value (upsert).
    async fn set_config(&self, key: &str, value: &str) -> DbResult<()>;
}
