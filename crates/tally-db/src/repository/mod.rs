//! # Repository Module
//!
//! SQL behind the [`LocalStore`](crate::LocalStore) implementation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (LocalStore)                                                 │
//! │       │                                                                 │
//! │       ├── db.records()  → RecordRepository   customers, products,      │
//! │       │                                      inventory_sessions,        │
//! │       │                                      counted_items              │
//! │       │                                                                 │
//! │       └── db.config()   → ConfigRepository   sync_config               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod records;
