//! # Domain Types
//!
//! Collection and status types shared by the store and the sync engine.
//!
//! ## Collections
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Synced Collections                               │
//! │                                                                         │
//! │  Variant        Local table          Wire name (server)                 │
//! │  ────────────   ──────────────────   ─────────────────────              │
//! │  Customers      customers            clientes                           │
//! │  Products       products             productos                          │
//! │  Sessions       inventory_sessions   sesiones                           │
//! │  CountedItems   counted_items        productos_contados                 │
//! │                                                                         │
//! │  Every table carries the same sync columns:                             │
//! │  local_id | uuid | business_id | is_dirty | sync_status | last_updated  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Collection
// =============================================================================

/// One of the entity collections replicated between device and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Business customers (inventory clients).
    Customers,
    /// Product catalogue entries.
    Products,
    /// Inventory-count sessions.
    Sessions,
    /// Line items counted within a session.
    CountedItems,
}

impl Collection {
    /// Every collection, in push order.
    pub const ALL: [Collection; 4] = [
        Collection::Customers,
        Collection::Products,
        Collection::Sessions,
        Collection::CountedItems,
    ];

    /// Name used in `/sync/batch` change maps and the `tables` pull parameter.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Collection::Customers => "clientes",
            Collection::Products => "productos",
            Collection::Sessions => "sesiones",
            Collection::CountedItems => "productos_contados",
        }
    }

    /// Name of the local SQLite table.
    pub const fn table_name(&self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Products => "products",
            Collection::Sessions => "inventory_sessions",
            Collection::CountedItems => "counted_items",
        }
    }

    /// Snake-case identifier used in config files and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Products => "products",
            Collection::Sessions => "sessions",
            Collection::CountedItems => "counted_items",
        }
    }

    /// Resolves a server-side collection name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.wire_name() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = CoreError;

    /// Accepts both the local identifier (`counted_items`) and the wire name
    /// (`productos_contados`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name || c.wire_name() == name)
            .ok_or(CoreError::UnknownCollection(name))
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Replication state of a record, kept redundantly next to `is_dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Has local changes the server has not confirmed.
    #[default]
    Pending,
    /// Matches the last server-confirmed copy.
    Synced,
}

impl SyncStatus {
    /// Derives the status from the dirty flag.
    pub const fn from_dirty(is_dirty: bool) -> Self {
        if is_dirty {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        }
    }

    /// Column value stored in SQLite.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            other => Err(CoreError::InvalidRecord(format!(
                "unknown sync_status '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(
                Collection::from_wire_name(collection.wire_name()),
                Some(collection)
            );
        }
        assert_eq!(Collection::from_wire_name("ventas"), None);
    }

    #[test]
    fn test_collection_parsing_accepts_both_names() {
        assert_eq!(
            "counted_items".parse::<Collection>().unwrap(),
            Collection::CountedItems
        );
        assert_eq!(
            "productos_contados".parse::<Collection>().unwrap(),
            Collection::CountedItems
        );
        assert_eq!("Clientes".parse::<Collection>().unwrap(), Collection::Customers);
        assert!("invoices".parse::<Collection>().is_err());
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut names: Vec<_> = Collection::ALL.iter().map(|c| c.table_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_sync_status_from_dirty() {
        assert_eq!(SyncStatus::from_dirty(true), SyncStatus::Pending);
        assert_eq!(SyncStatus::from_dirty(false), SyncStatus::Synced);
        assert_eq!("synced".parse::<SyncStatus>().unwrap(), SyncStatus::Synced);
        assert!("done".parse::<SyncStatus>().is_err());
    }
}
