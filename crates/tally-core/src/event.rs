//! # Sync Events and Statistics
//!
//! What the UI layer receives from the engine: one event per finished cycle
//! and an on-demand pending-count snapshot.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Collection;

/// Outcome class of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    SyncSuccess,
    SyncError,
}

/// Direction of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Client → server.
    Push,
    /// Server → client.
    Pull,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::Push => write!(f, "push"),
            SyncDirection::Pull => write!(f, "pull"),
        }
    }
}

/// Notification published after a push or pull cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub direction: SyncDirection,
    /// Records sent (push) or applied (pull). Zero is a valid success.
    pub count: Option<u64>,
    /// Failure description for `sync_error` events.
    pub error: Option<String>,
    /// Whether the engine will retry on its own (always true for cycle errors
    /// except storage failures).
    pub retryable: bool,
}

impl SyncEvent {
    /// A successful cycle that moved `count` records.
    pub fn success(direction: SyncDirection, count: u64) -> Self {
        SyncEvent {
            kind: SyncEventKind::SyncSuccess,
            direction,
            count: Some(count),
            error: None,
            retryable: false,
        }
    }

    /// A failed cycle.
    pub fn failure(direction: SyncDirection, error: impl Into<String>, retryable: bool) -> Self {
        SyncEvent {
            kind: SyncEventKind::SyncError,
            direction,
            count: None,
            error: Some(error.into()),
            retryable,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == SyncEventKind::SyncSuccess
    }
}

/// Pending records in one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub collection: Collection,
    pub pending: u64,
}

/// Snapshot of the engine's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Dirty records across all collections.
    pub pending: u64,
    pub collections: Vec<CollectionStats>,
    /// Checkpoint in epoch millis (0 = never synced).
    pub last_sync: i64,
    pub is_online: bool,
    pub device_id: String,
}

impl SyncStats {
    /// Pending count for one collection (0 if absent).
    pub fn pending_in(&self, collection: Collection) -> u64 {
        self.collections
            .iter()
            .find(|c| c.collection == collection)
            .map_or(0, |c| c.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::success(SyncDirection::Pull, 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "sync_success");
        assert_eq!(json["direction"], "pull");
        assert_eq!(json["count"], 0);

        let failure = SyncEvent::failure(SyncDirection::Push, "timeout", true);
        assert!(!failure.is_success());
        assert_eq!(failure.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_pending_in() {
        let stats = SyncStats {
            pending: 3,
            collections: vec![CollectionStats {
                collection: Collection::Products,
                pending: 3,
            }],
            last_sync: 0,
            is_online: true,
            device_id: "d".into(),
        };
        assert_eq!(stats.pending_in(Collection::Products), 3);
        assert_eq!(stats.pending_in(Collection::Customers), 0);
    }
}
