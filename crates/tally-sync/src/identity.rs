//! # Device Identity
//!
//! The permanent device id and the sync checkpoint, both persisted in the
//! store's config table.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Device Identity                                  │
//! │                                                                         │
//! │  First start                      Every later start                    │
//! │  ───────────                      ─────────────────                    │
//! │  device_id missing                device_id read back, never changed   │
//! │    └─► "device-<millis>-<rand9>"                                       │
//! │        persisted once                                                  │
//! │                                                                         │
//! │  last_sync_timestamp missing ──► 0 (first pull fetches everything)     │
//! │                                                                         │
//! │  advance(ts): persisted only if ts > current; never rolls back         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tally_core::{CONFIG_DEVICE_ID, CONFIG_LAST_SYNC};
use tally_db::LocalStore;

use crate::clock::{Clock, IdGenerator};
use crate::error::SyncResult;

/// Length of the random part of a generated device id.
const DEVICE_SUFFIX_LEN: usize = 9;

/// Builds a fresh device id: `device-<epoch millis>-<9 chars>`.
pub fn generate_device_id(now_millis: i64, ids: &dyn IdGenerator) -> String {
    let suffix: String = ids
        .new_id()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(DEVICE_SUFFIX_LEN)
        .collect::<String>()
        .to_ascii_lowercase();

    format!("device-{now_millis}-{suffix}")
}

/// Device id plus the monotonic sync checkpoint.
pub struct DeviceIdentity {
    store: Arc<dyn LocalStore>,
    device_id: String,
    last_sync: AtomicI64,
    /// Serialises checkpoint compare-and-persist between push and pull.
    checkpoint_lock: Mutex<()>,
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("last_sync", &self.last_sync())
            .finish()
    }
}

impl DeviceIdentity {
    /// Loads the identity, generating and persisting a device id on first run.
    ///
    /// ## Returns
    /// * `Ok(DeviceIdentity)` - With the stored (or new) device id and checkpoint
    /// * `Err(SyncError::Storage)` - The config table could not be read or written
    pub async fn load(
        store: Arc<dyn LocalStore>,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> SyncResult<Self> {
        let device_id = match store.get_config(CONFIG_DEVICE_ID).await? {
            Some(id) if !id.is_empty() => {
                debug!(device_id = %id, "Loaded device id");
                id
            }
            _ => {
                let id = generate_device_id(clock.now_millis(), ids);
                store.set_config(CONFIG_DEVICE_ID, &id).await?;
                info!(device_id = %id, "Generated new device id");
                id
            }
        };

        let last_sync = match store.get_config(CONFIG_LAST_SYNC).await? {
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!(value = %raw, "Unreadable sync checkpoint, starting from 0");
                0
            }),
            None => 0,
        };

        info!(device_id = %device_id, last_sync, "Device identity ready");

        Ok(DeviceIdentity {
            store,
            device_id,
            last_sync: AtomicI64::new(last_sync),
            checkpoint_lock: Mutex::new(()),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The current checkpoint (0 = never synced).
    pub fn last_sync(&self) -> i64 {
        self.last_sync.load(Ordering::SeqCst)
    }

    /// Moves the checkpoint forward to a server-issued timestamp.
    ///
    /// ## Returns
    /// * `Ok(true)` - Persisted and advanced
    /// * `Ok(false)` - `server_timestamp` was not newer; nothing written
    pub async fn advance(&self, server_timestamp: i64) -> SyncResult<bool> {
        let _guard = self.checkpoint_lock.lock().await;

        let current = self.last_sync();
        if server_timestamp <= current {
            debug!(current, server_timestamp, "Checkpoint not advanced");
            return Ok(false);
        }

        // Disk first, so memory is never ahead of what survives a restart.
        self.store
            .set_config(CONFIG_LAST_SYNC, &server_timestamp.to_string())
            .await?;
        self.last_sync.store(server_timestamp, Ordering::SeqCst);

        debug!(from = current, to = server_timestamp, "Checkpoint advanced");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIds};
    use tally_db::{Database, DbConfig};

    async fn store() -> Arc<dyn LocalStore> {
        Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    #[test]
    fn test_generate_device_id_format() {
        let ids = SequentialIds::new("abcdefghij-klm");
        let id = generate_device_id(1_700_000_000_000, &ids);
        assert_eq!(id, "device-1700000000000-abcdefghi");
    }

    #[tokio::test]
    async fn test_device_id_generated_once() {
        let store = store().await;
        let clock = FixedClock::new(1_000);
        let ids = SequentialIds::new("x");

        let first = DeviceIdentity::load(store.clone(), &clock, &ids).await.unwrap();
        assert_eq!(first.last_sync(), 0);

        clock.advance(60_000);
        let second = DeviceIdentity::load(store.clone(), &clock, &ids).await.unwrap();
        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(
            store.get_config(CONFIG_DEVICE_ID).await.unwrap().as_deref(),
            Some(first.device_id())
        );
    }

    #[tokio::test]
    async fn test_checkpoint_is_monotonic_and_persisted() {
        let store = store().await;
        let identity = DeviceIdentity::load(store.clone(), &FixedClock::new(0), &SequentialIds::new("d"))
            .await
            .unwrap();

        assert!(identity.advance(500).await.unwrap());
        assert!(!identity.advance(400).await.unwrap());
        assert!(!identity.advance(500).await.unwrap());
        assert_eq!(identity.last_sync(), 500);

        let reloaded = DeviceIdentity::load(store, &FixedClock::new(0), &SequentialIds::new("d"))
            .await
            .unwrap();
        assert_eq!(reloaded.last_sync(), 500);
    }
}
