//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Server              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  ServerRejected         │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  InvalidResponse        │ │
//! │  │  ConfigLoad/Save│  │                 │  │  Unauthorized           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Storage      │  │    Local write  │                              │
//! │  │                 │  │                 │                              │
//! │  │  Storage(DbErr) │  │  InvalidRecord  │                              │
//! │  │                 │  │  NotFound       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │                                                                         │
//! │  Retry policy: transport + server errors wait for the next tick.       │
//! │  Storage errors are surfaced and never retried by the engine itself.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ValidationError};
use tally_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not reach the server.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// Non-2xx status or `success: false`.
    #[error("Server rejected request (status {status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Response body could not be understood.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// HTTP 401. Both directions pause for the auth cooldown.
    #[error("Server rejected credentials")]
    Unauthorized,

    // =========================================================================
    // Local Write Errors
    // =========================================================================
    /// A local write was rejected before reaching the store.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// `update_local` / `delete_local` target does not exist.
    #[error("{collection} record not found: {local_id}")]
    NotFound {
        collection: String,
        local_id: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A scheduled sync cycle task panicked.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The configured timeout is not carried by reqwest; callers that
            // know it map timeouts themselves.
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::ServerRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        SyncError::InvalidRecord(err.to_string())
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::InvalidRecord(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the next scheduled cycle should simply try again.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - Server rejections and malformed responses (dirty set is preserved)
    /// - Unauthorized (after the auth cooldown)
    ///
    /// ## Non-Retryable Errors
    /// - Storage failures
    /// - Configuration errors
    /// - Invalid local writes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Timeout(_)
                | SyncError::ServerRejected { .. }
                | SyncError::InvalidResponse(_)
                | SyncError::Unauthorized
        )
    }

    /// Returns true if local persistence failed.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::ServerRejected {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(SyncError::Unauthorized.is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::Storage(DbError::PoolExhausted).is_retryable());
    }

    #[test]
    fn test_categories() {
        assert!(SyncError::Storage(DbError::PoolExhausted).is_storage_error());
        assert!(SyncError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!SyncError::Network("x".into()).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::NotFound {
            collection: "customers".into(),
            local_id: "abc-123".into(),
        };
        assert!(err.to_string().contains("customers"));
        assert!(err.to_string().contains("abc-123"));
    }
}
