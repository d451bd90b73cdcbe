//! # ttlshard - A Sharded In-Process Cache with TTL Expiry
//!
//! ttlshard is a generic, concurrency-safe key-value cache for services that
//! need a fast ephemeral store keyed by short identifiers: UUIDs,
//! alphanumeric tokens or numeric ids.
//!
//! ## Features
//!
//! - **Hash-Free Routing**: A key's last character picks its shard
//! - **Profiles**: Shard layouts tuned for alphanumeric, UUID or numeric keys
//! - **Per-Shard Locks**: Independent `RwLock`s, never held two at a time
//! - **Background Expiry**: One staggered Tokio sweeper per physical shard
//! - **Total API**: No operation panics or fails, even after close
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Store<V>                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │    Key      │───>│                 Shard array                  │    │
//! │  │ Classifier  │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  │ (last byte) │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │overflow│ │    │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │(shared)│ │    │
//! │                     │  └───▲────┘ └───▲────┘ └───▲────┘ └───▲────┘ │    │
//! │                     └──────┼──────────┼──────────┼──────────┼──────┘    │
//! │                     ┌──────┴──────────┴──────────┴──────────┴──────┐    │
//! │                     │   Invalidators (one Tokio task per shard)    │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ttlshard::Store;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Entries live for 30 seconds; sweepers run on this runtime
//!     let store: Store<String> = Store::new_uuid(Duration::from_secs(30));
//!
//!     store.set("1f586b6c-68e9-4b59-8e2c-7e0dacf2409b", "alice".to_string());
//!     store.set_with_ttl("e30d341f-be81-487f-b368-9d045d263044", "bob".to_string(), Duration::from_secs(5));
//!
//!     assert_eq!(store.len(), 2);
//!
//!     store.close();
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Classifier, shards, profiles, invalidators and the store
//! - [`config`]: Construction parameters
//! - [`error`]: Configuration errors
//!
//! ## Design Highlights
//!
//! ### Aliased Shards
//!
//! The UUID and numeric profiles point all low-traffic slots at one shared
//! shard. Shared slots always sit at the tail of the array, so the store can
//! count each physical shard once by stopping at the first pair of identical
//! neighbours.
//!
//! ### Stale Reads
//!
//! `get` does not look at expiry times; an expired entry stays visible until
//! the next sweep of its shard. `get_fresh` performs the strict check.
//!
//! ### Runtime
//!
//! Sweepers are Tokio tasks spawned on the runtime in
//! [`StoreConfig::runtime`] or, if unset, the runtime the store is created
//! in. Without any runtime the store still works, but expired entries are
//! only removed by [`Store::invalidate`].

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::StoreConfig;
pub use error::{ConfigError, Result};
pub use storage::{InvalidatorConfig, Profile, Store, StoreStats};

/// Version of ttlshard
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
