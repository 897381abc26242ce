//! # Sync Engine
//!
//! Push and pull cycles, the local write path and sync statistics.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                                     │
//! │                                                                         │
//! │   UI / host app                         SyncScheduler                   │
//! │   create_local / update_local /         timers, reconnect, kicks        │
//! │   delete_local / stats                          │                       │
//! │          │                                      ▼                       │
//! │          │                     ┌──────────────────────────────┐         │
//! │          │                     │  push()           pull()     │         │
//! │          │                     │  [pushing flag]   [pulling]  │         │
//! │          ▼                     └──────┬───────────────┬───────┘         │
//! │   ┌──────────────┐  get_dirty /       │               │ merge_remote    │
//! │   │  LocalStore  │◄─ mark_synced ─────┘               └──────────►      │
//! │   └──────────────┘                                                      │
//! │          ▲                     ┌──────────────┐    ┌──────────────┐     │
//! │          └── config table ─────│DeviceIdentity│    │SyncTransport │     │
//! │                                └──────────────┘    └──────────────┘     │
//! │                                                                         │
//! │   Every finished cycle is published on the EventBus.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cycle Outcomes
//! A cycle that did not run returns `Ok(CycleOutcome::Skipped(..))` and emits
//! nothing. A cycle that ran emits exactly one event: `sync_success` with the
//! record count, or `sync_error` alongside the returned `Err`.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tally_core::{
    validate_fields, validate_record, Collection, CollectionStats, Record, SyncDirection,
    SyncEvent, SyncStats,
};
use tally_db::LocalStore;

use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::EventBus;
use crate::identity::DeviceIdentity;
use crate::protocol::{BatchRequest, PullQuery};
use crate::scheduler::Kick;
use crate::transport::{HttpTransport, SyncTransport};

// =============================================================================
// Cycle Outcome
// =============================================================================

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A cycle in the same direction is in flight.
    AlreadyRunning,
    /// The device is offline.
    Offline,
    /// The pre-push health probe failed.
    ServerUnreachable,
    /// The server rejected credentials recently.
    AuthCooldown,
    /// No dirty records to push.
    NothingToDo,
}

/// Result of one push or pull invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran. `count` is records sent (push) or applied (pull).
    Completed { count: u64 },
    Skipped(SkipReason),
}

impl CycleOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped(_))
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            CycleOutcome::Completed { count } => Some(*count),
            CycleOutcome::Skipped(_) => None,
        }
    }
}

/// Holds a direction's in-flight flag; clears it on drop.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The offline-first sync engine. One per process.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn SyncTransport>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    identity: DeviceIdentity,
    connectivity: Arc<ConnectivityMonitor>,
    events: Arc<EventBus>,

    pushing: AtomicBool,
    pulling: AtomicBool,

    /// Clock millis until which both directions stay paused after a 401.
    auth_cooldown_until: AtomicI64,

    /// Last `last_updated` handed to a local write.
    last_issued: AtomicI64,

    /// Present while a scheduler is running.
    kick_tx: Mutex<Option<mpsc::Sender<Kick>>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("identity", &self.identity)
            .field("online", &self.connectivity.is_online())
            .field("pushing", &self.pushing.load(Ordering::Relaxed))
            .field("pulling", &self.pulling.load(Ordering::Relaxed))
            .finish()
    }
}

impl SyncEngine {
    /// Starts a builder for the given configuration.
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Sends every dirty record in one batch.
    ///
    /// ## Returns
    /// * `Ok(Completed { count })` - Batch acknowledged; `count` records sent
    /// * `Ok(Skipped(..))` - Offline, already pushing, server unreachable,
    ///   auth cooldown, or nothing dirty
    /// * `Err(..)` - Transport, server or storage failure; no dirty flag was
    ///   cleared unless the server had already acknowledged the batch
    pub async fn push(&self) -> SyncResult<CycleOutcome> {
        if let Some(reason) = self.blocked() {
            debug!(?reason, "Push skipped");
            return Ok(CycleOutcome::Skipped(reason));
        }

        let Some(_guard) = CycleGuard::try_acquire(&self.pushing) else {
            debug!("Push already in flight");
            return Ok(CycleOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        if let Err(e) = self.transport.health().await {
            debug!(error = %e, "Sync server unreachable, push deferred");
            return Ok(CycleOutcome::Skipped(SkipReason::ServerUnreachable));
        }

        let result = self.push_cycle().await;
        self.finish(SyncDirection::Push, result)
    }

    async fn push_cycle(&self) -> SyncResult<CycleOutcome> {
        let mut request = BatchRequest::new(self.identity.device_id(), self.clock.now_millis());
        let mut submitted: Vec<(Collection, String, i64)> = Vec::new();

        for collection in Collection::ALL {
            let dirty = self.store.get_dirty(collection).await?;
            submitted.extend(
                dirty
                    .iter()
                    .map(|r| (collection, r.local_id.clone(), r.last_updated)),
            );
            request.add(collection, dirty);
        }

        if request.is_empty() {
            debug!("No dirty records to push");
            return Ok(CycleOutcome::Skipped(SkipReason::NothingToDo));
        }

        let sent = request.record_count() as u64;
        info!(records = sent, "Pushing local changes");

        let ack = self.transport.push_batch(&request).await?;
        self.clear_auth_cooldown();

        if let Some(processed) = &ack.processed {
            debug!(%processed, "Server processed batch");
        }
        if !ack.errors.is_empty() {
            warn!(errors = ack.errors.len(), "Server reported per-record errors");
        }

        let mut cleared = 0u64;
        for (collection, local_id, last_updated) in &submitted {
            if self
                .store
                .mark_synced(*collection, local_id, *last_updated)
                .await?
            {
                cleared += 1;
            } else {
                debug!(
                    collection = %collection,
                    local_id = %local_id,
                    "Record edited during push, stays dirty"
                );
            }
        }

        match ack.server_timestamp {
            Some(ts) => {
                self.identity.advance(ts).await?;
            }
            None => debug!("Batch acknowledged without serverTimestamp"),
        }

        info!(sent, cleared, "Push complete");
        Ok(CycleOutcome::Completed { count: sent })
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Fetches remote changes since the checkpoint and merges them.
    ///
    /// Pulled records never overwrite a dirty local copy. The checkpoint
    /// advances even when records were skipped for that reason.
    ///
    /// ## Returns
    /// * `Ok(Completed { count })` - `count` records applied (may be 0)
    /// * `Ok(Skipped(..))` - Offline, already pulling, or auth cooldown
    /// * `Err(..)` - Transport, server or storage failure; checkpoint unchanged
    pub async fn pull(&self) -> SyncResult<CycleOutcome> {
        if let Some(reason) = self.blocked() {
            debug!(?reason, "Pull skipped");
            return Ok(CycleOutcome::Skipped(reason));
        }

        let Some(_guard) = CycleGuard::try_acquire(&self.pulling) else {
            debug!("Pull already in flight");
            return Ok(CycleOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let result = self.pull_cycle().await;
        self.finish(SyncDirection::Pull, result)
    }

    /// Manual "sync now": one push, then one pull.
    ///
    /// The pull starts only after the push has finished, so it asks for
    /// changes since the checkpoint the push just set. A failed push does
    /// not prevent the pull.
    ///
    /// ## Returns
    /// * `(push, pull)` - Each direction's outcome, as from [`Self::push`]
    ///   and [`Self::pull`]
    pub async fn sync_now(&self) -> (SyncResult<CycleOutcome>, SyncResult<CycleOutcome>) {
        info!("Manual sync requested");
        let push = self.push().await;
        let pull = self.pull().await;
        (push, pull)
    }

    async fn pull_cycle(&self) -> SyncResult<CycleOutcome> {
        let query = PullQuery {
            last_sync: self.identity.last_sync(),
            tables: self.config.sync.pull_collections.clone(),
        };

        let data = self.transport.pull(&query).await?;
        self.clear_auth_cooldown();

        let mut applied = 0u64;
        let mut skipped_dirty = 0u64;

        for (name, records) in data.updates {
            let Some(collection) = Collection::from_wire_name(&name) else {
                warn!(collection = %name, records = records.len(), "Ignoring unknown collection");
                continue;
            };

            for value in records {
                let record = match Record::from_remote(value, self.config.business_id()) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "Skipping malformed pulled record");
                        continue;
                    }
                };

                if self.store.merge_remote(collection, &record).await?.is_applied() {
                    applied += 1;
                } else {
                    skipped_dirty += 1;
                    debug!(
                        collection = %collection,
                        uuid = %record.uuid,
                        "Local copy is dirty, pulled update skipped"
                    );
                }
            }
        }

        match data.server_timestamp {
            Some(ts) => {
                self.identity.advance(ts).await?;
            }
            None => debug!("Pull response without serverTimestamp"),
        }

        info!(applied, skipped_dirty, "Pull complete");
        Ok(CycleOutcome::Completed { count: applied })
    }

    // =========================================================================
    // Cycle Helpers
    // =========================================================================

    fn blocked(&self) -> Option<SkipReason> {
        if !self.connectivity.is_online() {
            return Some(SkipReason::Offline);
        }
        if self.auth_cooldown_until.load(Ordering::SeqCst) > self.clock.now_millis() {
            return Some(SkipReason::AuthCooldown);
        }
        None
    }

    fn clear_auth_cooldown(&self) {
        self.auth_cooldown_until.store(0, Ordering::SeqCst);
    }

    /// Publishes the cycle's event and passes the result through.
    pub(crate) fn finish(
        &self,
        direction: SyncDirection,
        result: SyncResult<CycleOutcome>,
    ) -> SyncResult<CycleOutcome> {
        match &result {
            Ok(CycleOutcome::Completed { count }) => {
                self.events.notify(&SyncEvent::success(direction, *count));
            }
            Ok(CycleOutcome::Skipped(_)) => {}
            Err(e) => {
                if matches!(e, SyncError::Unauthorized) {
                    let cooldown = self.config.sync.auth_cooldown();
                    let until = self.clock.now_millis() + cooldown.as_millis() as i64;
                    self.auth_cooldown_until.store(until, Ordering::SeqCst);
                    warn!(
                        %direction,
                        cooldown_secs = cooldown.as_secs(),
                        "Credentials rejected, pausing sync"
                    );
                } else {
                    warn!(%direction, error = %e, retryable = e.is_retryable(), "Sync cycle failed");
                }
                self.events
                    .notify(&SyncEvent::failure(direction, e.to_string(), e.is_retryable()));
            }
        }
        result
    }

    // =========================================================================
    // Local Writes
    // =========================================================================

    /// Creates a record locally and schedules a push.
    ///
    /// ## Arguments
    /// * `collection` - Target collection
    /// * `fields` - Entity fields; sync-owned keys are rejected
    ///
    /// ## Returns
    /// The stored record (dirty, pending, `local_id == uuid`).
    pub async fn create_local(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> SyncResult<Record> {
        validate_fields(&fields)?;

        let record = Record::new_local(
            self.ids.new_id(),
            self.config.business_id(),
            fields,
            self.next_timestamp(),
        );
        validate_record(&record)?;

        self.store.put(collection, &record).await?;
        debug!(collection = %collection, local_id = %record.local_id, "Created local record");

        self.kick_local_write();
        Ok(record)
    }

    /// Merges `fields` into an existing record and marks it dirty.
    pub async fn update_local(
        &self,
        collection: Collection,
        local_id: &str,
        fields: Map<String, Value>,
    ) -> SyncResult<Record> {
        validate_fields(&fields)?;

        let mut record = self.live_record(collection, local_id).await?;
        record.apply_edit(fields, self.next_timestamp());
        validate_record(&record)?;

        self.store.put(collection, &record).await?;
        debug!(collection = %collection, local_id, "Updated local record");

        self.kick_local_write();
        Ok(record)
    }

    /// Replaces a record with a dirty tombstone the next push sends upstream.
    pub async fn delete_local(&self, collection: Collection, local_id: &str) -> SyncResult<Record> {
        let mut record = self.live_record(collection, local_id).await?;
        record.mark_deleted(self.next_timestamp());

        self.store.put(collection, &record).await?;
        debug!(collection = %collection, local_id, "Deleted local record");

        self.kick_local_write();
        Ok(record)
    }

    /// Visible records of a collection; tombstones are hidden.
    pub async fn list_local(&self, collection: Collection) -> SyncResult<Vec<Record>> {
        let records = self.store.get_all(collection).await?;
        Ok(records.into_iter().filter(|r| !r.is_tombstone()).collect())
    }

    /// A visible record by local id.
    pub async fn get_local(
        &self,
        collection: Collection,
        local_id: &str,
    ) -> SyncResult<Option<Record>> {
        let record = self.store.get(collection, local_id).await?;
        Ok(record.filter(|r| !r.is_tombstone()))
    }

    async fn live_record(&self, collection: Collection, local_id: &str) -> SyncResult<Record> {
        self.get_local(collection, local_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                collection: collection.to_string(),
                local_id: local_id.to_string(),
            })
    }

    /// `max(now, previous + 1)`, so local edits never share a timestamp.
    fn next_timestamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let previous = self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(previous + 1)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Pending counts, checkpoint and connectivity.
    pub async fn stats(&self) -> SyncResult<SyncStats> {
        let mut collections = Vec::with_capacity(Collection::ALL.len());
        let mut pending = 0;

        for collection in Collection::ALL {
            let count = self.store.count_dirty(collection).await?;
            pending += count;
            collections.push(CollectionStats {
                collection,
                pending: count,
            });
        }

        Ok(SyncStats {
            pending,
            collections,
            last_sync: self.identity.last_sync(),
            is_online: self.connectivity.is_online(),
            device_id: self.identity.device_id().to_string(),
        })
    }

    // =========================================================================
    // Scheduler Wiring
    // =========================================================================

    fn kicks(&self) -> MutexGuard<'_, Option<mpsc::Sender<Kick>>> {
        self.kick_tx.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn attach_scheduler(&self, tx: mpsc::Sender<Kick>) {
        *self.kicks() = Some(tx);
    }

    pub(crate) fn detach_scheduler(&self) {
        self.kicks().take();
    }

    fn kick_local_write(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        if let Some(tx) = self.kicks().as_ref() {
            // A full queue already holds a pending kick.
            let _ = tx.try_send(Kick::LocalWrite);
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`SyncEngine`] with injectable collaborators.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    store: Option<Arc<dyn LocalStore>>,
    transport: Option<Arc<dyn SyncTransport>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    events: Option<Arc<EventBus>>,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            store: None,
            transport: None,
            clock: None,
            ids: None,
            connectivity: None,
            events: None,
        }
    }

    /// Sets the local store (required).
    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn SyncTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Shares a connectivity monitor. Defaults to one that starts online.
    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the config, loads the device identity and builds the engine.
    pub async fn build(self) -> SyncResult<Arc<SyncEngine>> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| SyncError::InvalidConfig("Local store required".into()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&self.config)?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self.ids.unwrap_or_else(|| Arc::new(UuidGenerator));
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::new(true)));
        let events = self.events.unwrap_or_default();

        let identity = DeviceIdentity::load(store.clone(), clock.as_ref(), ids.as_ref()).await?;

        // Local timestamps continue above anything already stored, even if
        // the wall clock went backwards since the last run.
        let mut last_issued = 0;
        for collection in Collection::ALL {
            last_issued = last_issued.max(store.max_last_updated(collection).await?);
        }

        info!(
            device_id = %identity.device_id(),
            last_issued,
            business_id = %self.config.business_id(),
            server = %self.config.server_url(),
            "Sync engine ready"
        );

        Ok(Arc::new(SyncEngine {
            config: Arc::new(self.config),
            store,
            transport,
            clock,
            ids,
            identity,
            connectivity,
            events,
            pushing: AtomicBool::new(false),
            pulling: AtomicBool::new(false),
            auth_cooldown_until: AtomicI64::new(0),
            last_issued: AtomicI64::new(last_issued),
            kick_tx: Mutex::new(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIds};
    use crate::testing::MockTransport;
    use serde_json::json;
    use tally_db::{Database, DbConfig};

    struct Fixture {
        engine: Arc<SyncEngine>,
        transport: Arc<MockTransport>,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(FixedClock::new(1_000));

        let engine = SyncEngine::builder(SyncConfig::default())
            .with_store(store)
            .with_transport(transport.clone())
            .with_clock(clock.clone())
            .with_ids(Arc::new(SequentialIds::new("rec")))
            .build()
            .await
            .unwrap();

        Fixture {
            engine,
            transport,
            clock,
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cycle_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = CycleGuard::try_acquire(&flag).unwrap();
        assert!(CycleGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(CycleGuard::try_acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_builder_requires_store() {
        let err = SyncEngine::builder(SyncConfig::default())
            .with_transport(Arc::new(MockTransport::new()))
            .build()
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_create_local_is_dirty_and_keyed_by_uuid() {
        let f = fixture().await;
        let record = f
            .engine
            .create_local(Collection::Customers, fields(json!({"nombre": "Ana"})))
            .await
            .unwrap();

        assert!(record.uuid.starts_with("rec-"));
        assert_eq!(record.local_id, record.uuid);
        assert!(record.is_dirty);
        assert_eq!(record.business_id, "default-business");
        assert_eq!(record.last_updated, 1_000);

        let stats = f.engine.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.pending_in(Collection::Customers), 1);
    }

    #[tokio::test]
    async fn test_create_local_rejects_reserved_fields() {
        let f = fixture().await;
        let err = f
            .engine
            .create_local(Collection::Products, fields(json!({"is_dirty": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let f = fixture().await;
        let a = f
            .engine
            .create_local(Collection::Products, Map::new())
            .await
            .unwrap();
        let b = f
            .engine
            .update_local(Collection::Products, &a.local_id, fields(json!({"stock": 3})))
            .await
            .unwrap();
        assert!(b.last_updated > a.last_updated);
    }

    #[tokio::test]
    async fn test_delete_local_hides_record_and_stays_dirty() {
        let f = fixture().await;
        let record = f
            .engine
            .create_local(Collection::Sessions, Map::new())
            .await
            .unwrap();

        let tombstone = f
            .engine
            .delete_local(Collection::Sessions, &record.local_id)
            .await
            .unwrap();
        assert!(tombstone.is_tombstone());
        assert!(tombstone.is_dirty);

        assert!(f.engine.list_local(Collection::Sessions).await.unwrap().is_empty());
        let err = f
            .engine
            .update_local(Collection::Sessions, &record.local_id, Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_offline_cycles_are_skipped() {
        let f = fixture().await;
        f.engine.connectivity().set_online(false);

        assert_eq!(
            f.engine.push().await.unwrap(),
            CycleOutcome::Skipped(SkipReason::Offline)
        );
        assert_eq!(
            f.engine.pull().await.unwrap(),
            CycleOutcome::Skipped(SkipReason::Offline)
        );
        assert_eq!(f.transport.health_checks(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_skips_push_silently() {
        let f = fixture().await;
        f.engine
            .create_local(Collection::Customers, Map::new())
            .await
            .unwrap();
        f.transport.set_healthy(false);
        let mut rx = f.engine.events().subscribe();

        assert_eq!(
            f.engine.push().await.unwrap(),
            CycleOutcome::Skipped(SkipReason::ServerUnreachable)
        );
        assert!(f.transport.pushes().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unauthorized_pauses_both_directions() {
        let f = fixture().await;
        f.engine
            .create_local(Collection::Customers, Map::new())
            .await
            .unwrap();
        f.transport.push_reply(Err(SyncError::Unauthorized));

        assert!(matches!(
            f.engine.push().await,
            Err(SyncError::Unauthorized)
        ));
        assert_eq!(
            f.engine.pull().await.unwrap(),
            CycleOutcome::Skipped(SkipReason::AuthCooldown)
        );

        f.clock.advance(61_000);
        f.transport.ack_push(5_000);
        assert_eq!(
            f.engine.push().await.unwrap(),
            CycleOutcome::Completed { count: 1 }
        );
    }

    #[tokio::test]
    async fn test_pull_skips_malformed_and_unknown() {
        let f = fixture().await;
        let mut updates = std::collections::BTreeMap::new();
        updates.insert(
            "clientes".to_string(),
            vec![json!({"nombre": "sin uuid"}), json!({"uuid": "c-1", "nombre": "Eva"})],
        );
        updates.insert("ventas".to_string(), vec![json!({"uuid": "v-1"})]);
        f.transport.serve_pull(crate::protocol::PullData {
            updates,
            server_timestamp: Some(2_000),
        });

        assert_eq!(
            f.engine.pull().await.unwrap(),
            CycleOutcome::Completed { count: 1 }
        );
        let customers = f.engine.list_local(Collection::Customers).await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].fields["nombre"], "Eva");
        assert_eq!(f.engine.identity().last_sync(), 2_000);
    }
}
