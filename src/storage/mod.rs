//! Storage Module
//!
//! This module provides the core storage functionality: a key classifier,
//! independently locked shards, sharding profiles, per-shard background
//! invalidators and the [`Store`] facade tying them together.
//!
//! ## Architecture
//!
//! ```text
//!            key ──> classifier (last byte) ──> slot 0..36
//!                                                   │
//! ┌─────────────────────────────────────────────────▼───────────┐
//! │                         Store                               │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌───────────────────┐  │
//! │  │ Shard 0 │ │ Shard 1 │ │   ...   │ │ overflow (shared) │  │
//! │  │ RwLock  │ │ RwLock  │ │         │ │ RwLock            │  │
//! │  └────▲────┘ └────▲────┘ └─────────┘ └────────▲──────────┘  │
//! └───────┼───────────┼───────────────────────────┼─────────────┘
//!         │           │                           │
//!    invalidator  invalidator                invalidator
//!    (Tokio task, staggered start, one per physical shard)
//! ```
//!
//! ## Example
//!
//! ```
//! use ttlshard::storage::{Profile, Store};
//! use ttlshard::StoreConfig;
//! use std::time::Duration;
//!
//! let store: Store<u64> = Store::with_config(StoreConfig::new(Profile::Uuid, Duration::ZERO)).unwrap();
//!
//! store.set("1f586b6c-68e9-4b59-8e2c-7e0dacf2409b", 1);
//! store.set("session-z", 2); // non-hex tail, lands on the shared shard
//!
//! assert_eq!(store.len(), 2);
//! assert_eq!(store.shard_count(), 17);
//! ```

pub mod classifier;
pub mod engine;
pub mod expiry;
pub mod profile;
mod shard;

// Re-export commonly used types
pub use classifier::{classify, slot_index, SLOT_COUNT};
pub use engine::{Store, StoreStats};
pub use expiry::InvalidatorConfig;
pub use profile::Profile;
