//! # tally-sync: Offline-First Sync Engine for Tally
//!
//! Moves records between the local store and the remote server. Local
//! writes never wait for the network; dirty records are pushed in batches
//! and remote changes are pulled incrementally from a server checkpoint.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncScheduler                               │  │
//! │  │  push timer · pull timer · startup · reconnect · local writes    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       SyncEngine                                 │  │
//! │  │  push(): dirty set ──► POST /sync/batch ──► compare-and-clear    │  │
//! │  │  pull(): GET /sync/pull ──► merge unless local copy is dirty     │  │
//! │  └──────┬──────────────────┬──────────────────┬─────────────────────┘  │
//! │         ▼                  ▼                  ▼                         │
//! │  ┌──────────────┐  ┌────────────────┐  ┌────────────────────────┐      │
//! │  │ LocalStore   │  │ DeviceIdentity │  │ SyncTransport          │      │
//! │  │ (tally-db)   │  │ id + checkpoint│  │ (reqwest)              │      │
//! │  └──────────────┘  └────────────────┘  └────────────────────────┘      │
//! │                                                                         │
//! │  ConnectivityMonitor gates every cycle; EventBus reports every result. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML configuration with env overrides
//! - [`error`] - Sync error types
//! - [`clock`] - Injectable time and id sources
//! - [`identity`] - Device id and sync checkpoint
//! - [`connectivity`] - Online/offline state
//! - [`events`] - Listener registry and broadcast channel
//! - [`protocol`] - REST request/response bodies
//! - [`transport`] - HTTP client
//! - [`engine`] - Push, pull and local writes
//! - [`scheduler`] - Timers and triggers
//! - `testing` - Scripted transport for tests (`test-util` feature)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_db::{Database, DbConfig};
//! use tally_sync::{SyncConfig, SyncEngine, SyncScheduler};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Arc::new(Database::new(DbConfig::new("tally.db")).await?);
//!
//! let engine = SyncEngine::builder(config).with_store(db).build().await?;
//! let _sub = engine.events().add_listener(|event| println!("{event:?}"));
//!
//! let scheduler = SyncScheduler::new(engine.clone()).start();
//! engine.create_local(Collection::Customers, fields).await?;
//! // ...
//! scheduler.stop().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod protocol;
pub mod scheduler;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, FixedClock, IdGenerator, SequentialIds, SystemClock, UuidGenerator};
pub use config::{BusinessConfig, ServerSettings, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityMonitor, Transition};
pub use engine::{CycleOutcome, SkipReason, SyncEngine, SyncEngineBuilder};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, Subscription};
pub use identity::DeviceIdentity;
pub use protocol::{ApiEnvelope, BatchAck, BatchRequest, PullData, PullQuery};
pub use scheduler::{Kick, SchedulerHandle, SyncScheduler};
pub use transport::{HttpTransport, SyncTransport};
