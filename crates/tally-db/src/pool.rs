//! # Database Pool Management
//!
//! Connection pool creation for the SQLite-backed [`LocalStore`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── UI write path    (create/update/delete local)                │
//! │       ├── push cycle       (get_dirty, mark_synced)                    │
//! │       └── pull cycle       (merge_remote, set_config)                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! WAL lets the UI read while a sync cycle writes, and a crash never leaves a
//! half-applied put.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::config::ConfigRepository;
use crate::repository::records::RecordRepository;
use crate::store::{LocalStore, MergeOutcome};
use tally_core::{Collection, Record};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/tally.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// open forever (required for in-memory databases).
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Each call yields an isolated database that lives as long as the pool.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// SQLite-backed local store.
///
/// Cheap to clone; every clone shares the pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./tally.db")).await?;
/// let store: Arc<dyn LocalStore> = Arc::new(db.clone());
/// let dirty = db.records().get_dirty(Collection::Customers).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing local store"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.idle_timeout.map(|_| Duration::from_secs(30 * 60)))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the record repository.
    pub fn records(&self) -> RecordRepository {
        RecordRepository::new(self.pool.clone())
    }

    /// Returns the sync config repository.
    pub fn config(&self) -> ConfigRepository {
        ConfigRepository::new(self.pool.clone())
    }

    /// Closes the pool. Every later store call fails.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// LocalStore Implementation
// =============================================================================

#[async_trait]
impl LocalStore for Database {
    async fn get_all(&self, collection: Collection) -> DbResult<Vec<Record>> {
        self.records().get_all(collection).await
    }

    async fn get_dirty(&self, collection: Collection) -> DbResult<Vec<Record>> {
        self.records().get_dirty(collection).await
    }

    async fn get_by_uuid(&self, collection: Collection, uuid: &str) -> DbResult<Option<Record>> {
        self.records().get_by_uuid(collection, uuid).await
    }

    async fn get(&self, collection: Collection, local_id: &str) -> DbResult<Option<Record>> {
        self.records().get(collection, local_id).await
    }

    async fn put(&self, collection: Collection, record: &Record) -> DbResult<()> {
        self.records().put(collection, record).await
    }

    async fn delete(&self, collection: Collection, local_id: &str) -> DbResult<bool> {
        self.records().delete(collection, local_id).await
    }

    async fn count_dirty(&self, collection: Collection) -> DbResult<u64> {
        self.records().count_dirty(collection).await
    }

    async fn max_last_updated(&self, collection: Collection) -> DbResult<i64> {
        self.records().max_last_updated(collection).await
    }

    async fn mark_synced(
        &self,
        collection: Collection,
        local_id: &str,
        last_updated: i64,
    ) -> DbResult<bool> {
        self.records()
            .mark_synced(collection, local_id, last_updated)
            .await
    }

    async fn merge_remote(
        &self,
        collection: Collection,
        record: &Record,
    ) -> DbResult<MergeOutcome> {
        self.records().merge_remote(collection, record).await
    }

    async fn get_config(&self, key: &str) -> DbResult<Option<String>> {
        self.config().get(key).await
    }

    async fn set_config(&self, key: &str, value: &str) -> DbResult<()> {
        self.config().set(key, value).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use tally_core::SyncStatus;

    async fn store() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn local(uuid: &str, name: &str, ts: i64) -> Record {
        Record::new_local(uuid, "biz", fields(json!({ "nombre": name })), ts)
    }

    fn remote(local_id: &str, uuid: &str, name: &str) -> Record {
        Record::from_remote(
            json!({ "id": local_id, "uuid": uuid, "nombre": name, "last_updated": 5 }),
            "biz",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = store().await;
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let db = store().await;
        let record = local("u-1", "Ana", 10);

        db.put(Collection::Customers, &record).await.unwrap();

        let by_id = db.get(Collection::Customers, "u-1").await.unwrap().unwrap();
        assert_eq!(by_id, record);

        let by_uuid = db
            .get_by_uuid(Collection::Customers, "u-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_uuid.fields["nombre"], "Ana");

        // Collections are independent tables.
        assert!(db.get(Collection::Products, "u-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dirty_index_follows_put() {
        let db = store().await;
        let mut record = local("u-1", "Ana", 10);
        db.put(Collection::Products, &record).await.unwrap();
        db.put(Collection::Products, &local("u-2", "Ben", 11))
            .await
            .unwrap();

        assert_eq!(db.count_dirty(Collection::Products).await.unwrap(), 2);

        record.mark_synced();
        db.put(Collection::Products, &record).await.unwrap();

        let dirty = db.get_dirty(Collection::Products).await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].uuid, "u-2");
        assert_eq!(db.get_all(Collection::Products).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_uuid_rejected() {
        let db = store().await;
        db.put(Collection::Customers, &local("u-1", "Ana", 1))
            .await
            .unwrap();

        let mut clash = local("u-1", "Ana", 2);
        clash.local_id = "other".into();
        let err = db.put(Collection::Customers, &clash).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = store().await;
        db.put(Collection::Sessions, &local("u-1", "S", 1))
            .await
            .unwrap();

        assert!(db.delete(Collection::Sessions, "u-1").await.unwrap());
        assert!(!db.delete(Collection::Sessions, "u-1").await.unwrap());
        assert!(db.get(Collection::Sessions, "u-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_last_updated() {
        let db = store().await;
        assert_eq!(db.max_last_updated(Collection::Products).await.unwrap(), 0);

        db.put(Collection::Products, &local("u-1", "A", 40))
            .await
            .unwrap();
        db.put(Collection::Products, &local("u-2", "B", 25))
            .await
            .unwrap();

        assert_eq!(db.max_last_updated(Collection::Products).await.unwrap(), 40);
        assert_eq!(db.max_last_updated(Collection::Customers).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_synced_is_compare_and_clear() {
        let db = store().await;
        db.put(Collection::Customers, &local("u-1", "Ana", 10))
            .await
            .unwrap();

        // A newer edit landed after the snapshot with last_updated = 10.
        db.put(Collection::Customers, &local("u-1", "Ana B", 11))
            .await
            .unwrap();
        assert!(!db.mark_synced(Collection::Customers, "u-1", 10).await.unwrap());
        assert_eq!(db.count_dirty(Collection::Customers).await.unwrap(), 1);

        assert!(db.mark_synced(Collection::Customers, "u-1", 11).await.unwrap());
        let record = db.get(Collection::Customers, "u-1").await.unwrap().unwrap();
        assert!(!record.is_dirty);
        assert_eq!(record.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_merge_remote_inserts_new() {
        let db = store().await;
        let outcome = db
            .merge_remote(Collection::Products, &remote("7", "u-7", "Cola"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Inserted);
        let stored = db.get(Collection::Products, "7").await.unwrap().unwrap();
        assert!(!stored.is_dirty);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_merge_remote_rekeys_clean_record() {
        let db = store().await;
        let mut record = local("u-1", "Ana", 1);
        record.mark_synced();
        db.put(Collection::Customers, &record).await.unwrap();

        let outcome = db
            .merge_remote(Collection::Customers, &remote("42", "u-1", "Ana M"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Updated);
        assert!(db.get(Collection::Customers, "u-1").await.unwrap().is_none());
        let rekeyed = db
            .get_by_uuid(Collection::Customers, "u-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rekeyed.local_id, "42");
        assert_eq!(rekeyed.fields["nombre"], "Ana M");
    }

    #[tokio::test]
    async fn test_merge_remote_skips_dirty() {
        let db = store().await;
        let record = local("u-1", "Mine", 1);
        db.put(Collection::Customers, &record).await.unwrap();

        let outcome = db
            .merge_remote(Collection::Customers, &remote("42", "u-1", "Theirs"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::SkippedDirty);
        assert!(!outcome.is_applied());
        let kept = db.get(Collection::Customers, "u-1").await.unwrap().unwrap();
        assert_eq!(kept, record);
        assert!(db.get(Collection::Customers, "42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_config_table() {
        let db = store().await;
        assert_eq!(db.get_config("device_id").await.unwrap(), None);

        db.set_config("device_id", "device-1").await.unwrap();
        db.set_config("last_sync_timestamp", "100").await.unwrap();
        db.set_config("last_sync_timestamp", "200").await.unwrap();

        assert_eq!(
            db.get_config("device_id").await.unwrap().as_deref(),
            Some("device-1")
        );
        assert_eq!(
            db.get_config("last_sync_timestamp").await.unwrap().as_deref(),
            Some("200")
        );
    }
}
