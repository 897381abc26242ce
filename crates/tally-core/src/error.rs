//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Record shape / naming errors                   │
//! │  └── ValidationError  - Local write validation failures                │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Local store failures (StorageError)            │
//! │                                                                         │
//! │  tally-sync errors (separate crate)                                    │
//! │  └── SyncError        - Network / server / storage during a cycle      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → EventBus    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while building or normalising records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A collection name did not match any known collection.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A record arrived (or was stored) in a shape the engine cannot use.
    ///
    /// ## When This Occurs
    /// - Pulled record is not a JSON object
    /// - Pulled record carries neither `uuid` nor `id_uuid`
    /// - Stored `sync_status` column holds an unknown value
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Validation failures for records written through the local write path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("Field '{field}' is required")]
    Required { field: String },

    /// Entity fields tried to set one of the sync-managed columns.
    #[error("Field '{field}' is managed by the sync engine and cannot be set directly")]
    ReservedField { field: String },

    /// `sync_status` disagrees with `is_dirty`.
    #[error("Record {local_id} has sync_status '{status}' but is_dirty = {is_dirty}")]
    InconsistentStatus {
        local_id: String,
        status: String,
        is_dirty: bool,
    },
}
