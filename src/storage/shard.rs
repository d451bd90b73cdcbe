//! Shard: one independently locked slice of the key space.
//!
//! Each shard owns its own `RwLock<HashMap>`, its own TTL policy and at most
//! one background invalidator. Readers take the shared lock, writers
//! (`set`, `delete`, sweeps, `close`) take the exclusive lock. No operation
//! ever holds the locks of two shards at once.
//!
//! ## Lifecycle
//!
//! ```text
//!   Created ──(finite default TTL or first custom TTL)──> Started
//!      │                                                     │
//!      └──────────────────────> Closed <─────────────────────┘
//! ```
//!
//! `Closed` is terminal. Closing swaps the map for an empty one under the
//! exclusive lock, and every operation re-checks the closed flag once it
//! holds the lock, so nothing reaches the map after `close` returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::storage::expiry::{self, SweepContext};

/// Converts a TTL where zero means "never expire" into an optional TTL.
#[inline]
pub(crate) fn finite_ttl(ttl: Duration) -> Option<Duration> {
    (!ttl.is_zero()).then_some(ttl)
}

/// A stored value with its absolute expiry time.
#[derive(Debug, Clone)]
pub(crate) struct Item<V> {
    /// The actual value stored
    pub value: V,
    /// When this item expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl<V> Item<V> {
    /// Creates an item expiring `ttl` from now.
    ///
    /// A TTL too large to represent as an `Instant` never expires.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        Self { value, expires_at }
    }

    /// Checks if this item had expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

pub(crate) struct Shard<V> {
    /// Slot index this shard was created for
    slot: usize,
    data: RwLock<HashMap<String, Item<V>>>,
    /// TTL applied by `set` (None = never expires)
    ttl: Option<Duration>,
    /// Initial delay before the first sweep
    shift: Duration,
    /// Sweep schedule and runtime shared with the store's other shards
    sweep: Arc<SweepContext>,
    /// Single-use cancellation trigger for the invalidator
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    closed: AtomicBool,
    /// Number of items removed by sweeps
    expired: AtomicU64,
}

impl<V> std::fmt::Debug for Shard<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("slot", &self.slot)
            .field("ttl", &self.ttl)
            .field("shift", &self.shift)
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V> Shard<V> {
    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Item<V>>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Item<V>>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn shift(&self) -> Duration {
        self.shift
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Upserts an item using the shard's default TTL.
    pub fn set(&self, key: String, value: V) {
        self.insert(key, Item::new(value, self.ttl));
    }

    fn insert(&self, key: String, item: Item<V>) {
        if self.is_closed() {
            return;
        }
        let mut data = self.write();
        if self.is_closed() {
            return;
        }
        data.insert(key, item);
    }

    /// Removes a key, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut data = self.write();
        !self.is_closed() && data.remove(key).is_some()
    }

    /// Number of items currently held, expired or not.
    pub fn len(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let data = self.read();
        if self.is_closed() {
            return 0;
        }
        data.len()
    }

    pub fn keys(&self) -> Vec<String> {
        if self.is_closed() {
            return Vec::new();
        }
        let data = self.read();
        if self.is_closed() {
            return Vec::new();
        }
        data.keys().cloned().collect()
    }

    /// Deletes every item whose expiry is at or before now.
    ///
    /// Holds the exclusive lock for the whole scan. Returns the number of
    /// items removed.
    pub fn invalidate(&self) -> u64 {
        if self.is_closed() {
            return 0;
        }
        let now = Instant::now();
        let mut data = self.write();
        if self.is_closed() {
            return 0;
        }
        let before = data.len();
        data.retain(|_, item| !item.is_expired_at(now));
        let removed = (before - data.len()) as u64;
        drop(data);

        if removed > 0 {
            self.expired.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Total items removed by sweeps since creation.
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Closes the shard and signals its invalidator to stop.
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Does not wait for the invalidator to exit.
    pub fn close(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut data = self.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let old = std::mem::take(&mut *data);
        drop(data);
        drop(old);

        self.shutdown_tx.send_replace(true);
        true
    }
}

impl<V: Clone> Shard<V> {
    /// Reads a value without checking its expiry.
    pub fn get(&self, key: &str) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        let data = self.read();
        if self.is_closed() {
            return None;
        }
        data.get(key).map(|item| item.value.clone())
    }

    /// Reads a value, treating expired-but-unswept items as absent.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        let now = Instant::now();
        let data = self.read();
        if self.is_closed() {
            return None;
        }
        data.get(key)
            .filter(|item| !item.is_expired_at(now))
            .map(|item| item.value.clone())
    }
}

impl<V> Shard<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a shard, starting its invalidator when `ttl` is finite.
    pub fn new(
        slot: usize,
        ttl: Option<Duration>,
        shift: Duration,
        sweep: &Arc<SweepContext>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let shard = Arc::new(Self {
            slot,
            data: RwLock::new(HashMap::new()),
            ttl,
            shift,
            sweep: Arc::clone(sweep),
            shutdown_tx,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            expired: AtomicU64::new(0),
        });

        if let Some(ttl) = ttl {
            shard.start_invalidator(ttl);
        }
        shard
    }

    /// Upserts an item expiring `ttl` from now.
    ///
    /// A zero TTL yields an item that is already expired. Lazily starts the
    /// invalidator if it is not running yet, deriving the sweep period from
    /// `ttl`.
    pub fn set_with_ttl(self: &Arc<Self>, key: String, value: V, ttl: Duration) {
        self.insert(key, Item::new(value, Some(ttl)));

        if !self.is_started() {
            self.start_invalidator(ttl);
        }
    }

    /// Spawns the background sweep task at most once per shard.
    pub fn start_invalidator(self: &Arc<Self>, ttl: Duration) {
        if self.is_closed()
            || self
                .started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }

        let Some(runtime) = self.sweep.runtime() else {
            self.sweep.warn_no_runtime(self.slot);
            self.started.store(false, Ordering::Release);
            return;
        };

        let period = self.sweep.config.period_for(ttl);
        // Detached; `close` stops it through the watch channel
        let _ = expiry::spawn_invalidator(
            &runtime,
            Arc::clone(self),
            period,
            self.shutdown_tx.subscribe(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::expiry::InvalidatorConfig;

    fn new_shard(ttl: Option<Duration>) -> Arc<Shard<String>> {
        let sweep = SweepContext::new(InvalidatorConfig::default(), None);
        Shard::new(0, ttl, Duration::from_millis(5), &sweep)
    }

    #[test]
    fn test_set_get_delete() {
        let shard = new_shard(None);

        shard.set("key".to_string(), "value".to_string());
        assert_eq!(shard.get("key"), Some("value".to_string()));
        assert_eq!(shard.len(), 1);

        assert!(shard.delete("key"));
        assert_eq!(shard.get("key"), None);
        assert!(!shard.delete("key")); // Already deleted
    }

    #[test]
    fn test_overwrite_keeps_one_entry() {
        let shard = new_shard(None);

        shard.set("key".to_string(), "one".to_string());
        shard.set("key".to_string(), "two".to_string());

        assert_eq!(shard.get("key"), Some("two".to_string()));
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.keys(), vec!["key".to_string()]);
    }

    #[test]
    fn test_item_expiry_boundary() {
        let now = Instant::now();
        let item = Item {
            value: 1,
            expires_at: Some(now),
        };
        assert!(item.is_expired_at(now));
        assert!(!item.is_expired_at(now - Duration::from_millis(1)));

        let forever = Item::new(1, None);
        assert!(!forever.is_expired_at(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let item = Item::new(1, Some(Duration::MAX));
        assert!(item.expires_at.is_none());
    }

    #[test]
    fn test_invalidate_removes_only_expired() {
        let shard = new_shard(None);

        shard.insert("old".to_string(), Item::new("a".to_string(), Some(Duration::from_millis(10))));
        shard.insert("new".to_string(), Item::new("b".to_string(), Some(Duration::from_secs(60))));
        shard.set("forever".to_string(), "c".to_string());

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(shard.invalidate(), 1);
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.get("old"), None);
        assert_eq!(shard.expired_count(), 1);
    }

    #[test]
    fn test_get_returns_stale_until_swept() {
        let shard = new_shard(None);

        shard.insert("stale".to_string(), Item::new("v".to_string(), Some(Duration::from_millis(10))));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(shard.get("stale"), Some("v".to_string()));
        assert_eq!(shard.get_fresh("stale"), None);

        shard.invalidate();
        assert_eq!(shard.get("stale"), None);
    }

    #[test]
    fn test_close_is_terminal() {
        let shard = new_shard(None);
        shard.set("key".to_string(), "value".to_string());

        assert!(shard.close());
        assert!(!shard.close());

        assert!(shard.is_closed());
        assert_eq!(shard.get("key"), None);
        assert_eq!(shard.len(), 0);
        assert!(shard.keys().is_empty());

        shard.set("key".to_string(), "again".to_string());
        assert_eq!(shard.len(), 0);
        assert_eq!(shard.invalidate(), 0);
    }

    #[test]
    fn test_no_runtime_leaves_shard_unstarted() {
        let shard = new_shard(Some(Duration::from_secs(1)));
        assert!(!shard.is_started());

        shard.set_with_ttl("key".to_string(), "value".to_string(), Duration::from_secs(1));
        assert!(!shard.is_started());
        assert_eq!(shard.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_concurrent_close_transitions_once() {
        use std::thread;

        let shard = new_shard(None);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let shard = Arc::clone(&shard);
                thread::spawn(move || shard.close())
            })
            .collect();

        let transitions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|closed| *closed)
            .count();
        assert_eq!(transitions, 1);
    }

    #[tokio::test]
    async fn test_custom_ttl_starts_invalidator_once() {
        let shard = new_shard(None);
        assert!(!shard.is_started());

        shard.set_with_ttl("a".to_string(), "1".to_string(), Duration::from_millis(50));
        assert!(shard.is_started());

        shard.close();
    }

    #[tokio::test]
    async fn test_zero_custom_ttl_is_already_expired() {
        let shard = new_shard(None);

        shard.set_with_ttl("b".to_string(), "2".to_string(), Duration::ZERO);
        assert!(shard.is_started());

        // Visible until swept
        assert_eq!(shard.get("b"), Some("2".to_string()));
        assert_eq!(shard.get_fresh("b"), None);
        assert_eq!(shard.invalidate(), 1);
        assert_eq!(shard.get("b"), None);

        shard.close();
    }

    #[test]
    fn test_concurrent_first_writes_start_one_invalidator() {
        use std::thread;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let sweep = SweepContext::new(InvalidatorConfig::default(), Some(runtime.handle().clone()));
        let shard: Arc<Shard<String>> = Shard::new(0, None, Duration::from_millis(5), &sweep);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let shard = Arc::clone(&shard);
                thread::spawn(move || {
                    shard.set_with_ttl(format!("key{}", i), "v".to_string(), Duration::from_secs(60));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        thread::sleep(Duration::from_millis(50));
        assert!(shard.is_started());
        // The test's handle plus exactly one sweeper task
        assert_eq!(Arc::strong_count(&shard), 2);
        assert_eq!(shard.len(), 16);

        shard.close();
    }
}
