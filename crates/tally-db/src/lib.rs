//! # tally-db: Local Store for Tally
//!
//! The durable, indexed record store the sync engine reads and writes.
//! SQLite via sqlx, one table per collection plus a `sync_config` table.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  UI write path / push cycle / pull cycle (tally-sync)                  │
//! │       │                                                                 │
//! │       │  Arc<dyn LocalStore>                                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo    │    │              │  │   │
//! │  │   │ impl          │◄───│ ConfigRepo    │    │ 001_init.sql │  │   │
//! │  │   │ LocalStore    │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/tally/tally.db                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `LocalStore` trait and `MergeOutcome`
//! - [`pool`] - Connection pool and the SQLite `LocalStore`
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store error types
//! - [`repository`] - SQL per table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig, LocalStore};
//! use tally_core::Collection;
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! let pending = db.count_dirty(Collection::Customers).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{LocalStore, MergeOutcome};

pub use repository::config::ConfigRepository;
pub use repository::records::RecordRepository;
