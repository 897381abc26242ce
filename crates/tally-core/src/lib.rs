//! # tally-core: Pure Sync Types
//!
//! Data model shared by the local store and the sync engine, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                UI layer (external collaborator)                 │   │
//! │  │    Customer / Product / Session forms, sync indicator           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ create/update/delete, SyncEvent        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-sync (engine)                          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  record   │  │   event   │  │ validation│  │   │
//! │  │   │Collection │  │  Record   │  │ SyncEvent │  │   rules   │  │   │
//! │  │   │SyncStatus │  │ from_remote│ │ SyncStats │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `Collection`, `SyncStatus`
//! - [`record`] - `Record` and remote-record normalisation
//! - [`event`] - `SyncEvent`, `SyncStats`
//! - [`error`] - Domain error types
//! - [`validation`] - Local write validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{Collection, Record};
//! use serde_json::Map;
//!
//! let record = Record::new_local("9b2f", "business-1", Map::new(), 1_700_000_000_000);
//! assert!(record.is_dirty);
//! assert_eq!(Collection::Customers.wire_name(), "clientes");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod record;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use event::{CollectionStats, SyncDirection, SyncEvent, SyncEventKind, SyncStats};
pub use record::{Record, RESERVED_FIELDS, TOMBSTONE_FIELD};
pub use types::{Collection, SyncStatus};
pub use validation::{validate_fields, validate_record};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Config-table key holding the permanent device identifier.
pub const CONFIG_DEVICE_ID: &str = "device_id";

/// Config-table key holding the server-issued checkpoint (epoch millis).
pub const CONFIG_LAST_SYNC: &str = "last_sync_timestamp";
