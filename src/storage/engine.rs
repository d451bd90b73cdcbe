//! Sharded Store with TTL Expiry
//!
//! This module implements the public facade of the cache. It routes each key
//! to a shard by its last character, aggregates cross-shard queries and owns
//! the store-wide closed flag.
//!
//! ## Design Decisions
//!
//! 1. **Classifier Routing**: No hashing. The trailing byte picks the shard.
//! 2. **Profiles**: Low-traffic slots may share one physical shard.
//! 3. **Active Expiry Only**: `get` does not check expiry; sweeps do.
//!    `get_fresh` is there for callers who need the strict read.
//! 4. **Total API**: Nothing panics or errors on an empty key, odd bytes or
//!    a closed store; operations return `None`, `0`, or do nothing.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   closed: AtomicBool (checked before any lock)              │
//! │  ┌─────────┐ ┌─────────┐       ┌─────────┐ ┌─────────────┐  │
//! │  │ Slot 0  │ │ Slot 1  │  ...  │ Slot 9  │ │ Slot 10..36 │  │
//! │  │ RwLock  │ │ RwLock  │       │ RwLock  │ │ (shared)    │  │
//! │  │ sweeper │ │ sweeper │       │ sweeper │ │ sweeper     │  │
//! │  └─────────┘ └─────────┘       └─────────┘ └─────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! No two shard locks are ever held at once, so there is no cross-shard
//! ordering and no global snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::storage::classifier::classify;
use crate::storage::profile::{build_shards, Profile};
use crate::storage::shard::Shard;

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Physically distinct shards
    pub shards: usize,
    /// Items currently held, including expired-but-unswept ones
    pub keys: usize,
    /// Items removed by sweeps since the store was created
    pub expired: u64,
}

/// An in-process key-value cache with per-shard background expiry.
///
/// # Thread Safety
///
/// `Store` is `Send + Sync` for `V: Send + Sync`; share it with an `Arc`.
/// Dropping the store closes it.
///
/// # Example
///
/// ```
/// use ttlshard::Store;
/// use std::time::Duration;
///
/// // Zero TTL: nothing expires, no runtime needed
/// let store: Store<String> = Store::new_numeric(Duration::ZERO);
///
/// store.set("123", "a".to_string());
/// assert_eq!(store.get("123"), Some("a".to_string()));
///
/// store.delete("123");
/// assert_eq!(store.get("123"), None);
/// assert_eq!(store.len(), 0);
/// ```
pub struct Store<V> {
    /// One entry per classifier slot; trailing slots may alias
    shards: Vec<Arc<Shard<V>>>,
    profile: Profile,
    default_ttl: Duration,
    /// Shards at or above this size get their own thread in `invalidate`
    concurrent_threshold: usize,
    closed: AtomicBool,
}

impl<V> std::fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("profile", &self.profile)
            .field("default_ttl", &self.default_ttl)
            .field("shards", &self.shard_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<V> Store<V> {
    /// Physically distinct shards, each yielded once.
    ///
    /// Walks the slot array until two neighbours are the same shard; by
    /// construction every slot from there on is that same shard, which has
    /// already been yielded.
    fn distinct_shards(&self) -> impl Iterator<Item = &Arc<Shard<V>>> + '_ {
        let rest = self
            .shards
            .windows(2)
            .take_while(|pair| !Arc::ptr_eq(&pair[0], &pair[1]))
            .map(|pair| &pair[1]);
        self.shards.first().into_iter().chain(rest)
    }

    #[inline]
    fn shard_for(&self, key: &str) -> Option<&Arc<Shard<V>>> {
        classify(key).map(|slot| &self.shards[slot])
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// TTL applied by [`set`](Self::set); zero means entries never expire.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of physically distinct shards.
    pub fn shard_count(&self) -> usize {
        self.distinct_shards().count()
    }

    /// Stores a value under the store's default TTL.
    ///
    /// Empty keys are ignored.
    pub fn set(&self, key: impl Into<String>, value: V) {
        if self.is_closed() {
            return;
        }
        let key = key.into();
        if let Some(shard) = self.shard_for(&key) {
            shard.set(key, value);
        }
    }

    /// Removes a key. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        self.shard_for(key)
            .map(|shard| shard.delete(key))
            .unwrap_or(false)
    }

    /// Number of items held across all physical shards.
    ///
    /// Expired items that no sweep has reached yet are still counted.
    pub fn len(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.distinct_shards().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists every key.
    ///
    /// Each shard is read under its own lock, so the result is a union of
    /// per-shard snapshots, not a point-in-time view of the whole store.
    pub fn keys(&self) -> Vec<String> {
        if self.is_closed() {
            return Vec::new();
        }
        let mut keys = Vec::new();
        for shard in self.distinct_shards() {
            keys.extend(shard.keys());
        }
        keys
    }

    pub fn stats(&self) -> StoreStats {
        if self.is_closed() {
            return StoreStats::default();
        }
        self.distinct_shards()
            .fold(StoreStats::default(), |mut stats, shard| {
                stats.shards += 1;
                stats.keys += shard.len();
                stats.expired += shard.expired_count();
                stats
            })
    }

    /// Closes the store and every physical shard.
    ///
    /// Only the first call does anything and returns `true`. Background
    /// sweepers are signalled but not awaited; once this returns no
    /// operation reaches any shard's map.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let closed = self.distinct_shards().filter(|shard| shard.close()).count();
        info!(profile = %self.profile, shards = closed, "Store closed");
        true
    }
}

impl<V> Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a store tuned for general alphanumeric keys.
    ///
    /// A zero `ttl` disables expiry. A finite `ttl` starts the background
    /// sweepers on the current Tokio runtime, which also serves sweepers
    /// started later by `set_with_ttl` from any thread.
    pub fn new(ttl: Duration) -> Self {
        Self::build(StoreConfig::new(Profile::Uniform, ttl))
    }

    /// Creates a store tuned for UUID keys.
    pub fn new_uuid(ttl: Duration) -> Self {
        Self::build(StoreConfig::new(Profile::Uuid, ttl))
    }

    /// Creates a store tuned for numeric keys.
    pub fn new_numeric(ttl: Duration) -> Self {
        Self::build(StoreConfig::new(Profile::Numeric, ttl))
    }

    /// Creates a store from an explicit configuration.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        let store = Self {
            shards: build_shards(&config),
            profile: config.profile,
            default_ttl: config.default_ttl,
            concurrent_threshold: config.invalidator.concurrent_threshold,
            closed: AtomicBool::new(false),
        };

        info!(
            profile = %store.profile,
            shards = store.shard_count(),
            default_ttl_ms = store.default_ttl.as_millis() as u64,
            "Store created"
        );
        store
    }

    /// Stores a value expiring `ttl` from now.
    ///
    /// A zero `ttl` stores an already-expired value: `get` still sees it
    /// until the next sweep. If the target shard has no sweeper yet, this
    /// starts one with a period derived from `ttl`.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if self.is_closed() {
            return;
        }
        let key = key.into();
        if let Some(shard) = self.shard_for(&key) {
            shard.set_with_ttl(key, value, ttl);
        }
    }

    /// Reads a value.
    ///
    /// Expiry is not checked here: an item past its TTL is returned until a
    /// sweep removes it, which happens within one sweep period. Use
    /// [`get_fresh`](Self::get_fresh) when that is not acceptable.
    pub fn get(&self, key: &str) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        self.shard_for(key).and_then(|shard| shard.get(key))
    }

    /// Reads a value, treating items past their TTL as absent.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        self.shard_for(key).and_then(|shard| shard.get_fresh(key))
    }

    /// Sweeps every physical shard now and returns the number of items removed.
    ///
    /// Large shards are swept on their own threads, small ones inline. Blocks
    /// until every sweep has finished.
    pub fn invalidate(&self) -> u64 {
        if self.is_closed() {
            return 0;
        }

        let removed = AtomicU64::new(0);
        thread::scope(|scope| {
            for shard in self.distinct_shards() {
                if shard.len() >= self.concurrent_threshold {
                    let removed = &removed;
                    scope.spawn(move || {
                        removed.fetch_add(shard.invalidate(), Ordering::Relaxed);
                    });
                } else {
                    removed.fetch_add(shard.invalidate(), Ordering::Relaxed);
                }
            }
        });

        let removed = removed.into_inner();
        debug!(removed = removed, "Forced invalidation finished");
        removed
    }
}

impl<V> Drop for Store<V> {
    fn drop(&mut self) {
        self.close();
    }
}
