//! Per-Shard Background Invalidator
//!
//! Every physically distinct shard with a finite TTL owns one Tokio task that
//! periodically sweeps it for expired items. This is what reclaims memory for
//! keys that are written once and never touched again.
//!
//! ## Design
//!
//! Each invalidator:
//! 1. Waits its shard's stagger delay, `(slot + 1) × stagger`
//! 2. Ticks every `clamp(ttl / ttl_divisor, period_min, period_max)`
//! 3. On each tick, takes the shard's write lock and removes expired items
//! 4. Exits on the first tick or wake-up after the shard is closed
//!
//! ## Why Stagger?
//!
//! With 37 shards all created in the same instant, un-staggered tickers would
//! fire in lockstep and every shard would block writers at the same moment.
//! Shifting each shard's first sweep spreads the sweeps across the period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::{ConfigError, Result};
use crate::storage::shard::Shard;

/// Tuning for the per-shard invalidators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidatorConfig {
    /// Base stagger; shard `i` waits `(i + 1) × stagger` before its first sweep (default: 100ms)
    pub stagger: Duration,

    /// Minimum interval between sweeps (default: 200ms)
    pub period_min: Duration,

    /// Maximum interval between sweeps (default: 10min)
    pub period_max: Duration,

    /// The sweep period is `ttl / ttl_divisor` before clamping (default: 5)
    pub ttl_divisor: u32,

    /// Shards holding at least this many items are swept on their own
    /// thread by a forced `invalidate` (default: 1000)
    pub concurrent_threshold: usize,
}

impl Default for InvalidatorConfig {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(100),
            period_min: Duration::from_millis(200),
            period_max: Duration::from_secs(600),
            ttl_divisor: 5,
            concurrent_threshold: 1000,
        }
    }
}

impl InvalidatorConfig {
    /// Sweep period for a shard whose items live for `ttl`.
    pub fn period_for(&self, ttl: Duration) -> Duration {
        let max = self.period_max.max(self.period_min);
        (ttl / self.ttl_divisor.max(1)).clamp(self.period_min, max)
    }

    /// Initial delay for the shard built for `slot`.
    pub fn shift_for(&self, slot: usize) -> Duration {
        let factor = u32::try_from(slot + 1).unwrap_or(u32::MAX);
        self.stagger.saturating_mul(factor)
    }

    /// Checks that the sweep schedule is usable.
    pub fn validate(&self) -> Result<()> {
        if self.stagger.is_zero() {
            return Err(ConfigError::ZeroStagger);
        }
        if self.period_min.is_zero() {
            return Err(ConfigError::ZeroPeriodMin);
        }
        if self.period_min > self.period_max {
            return Err(ConfigError::InvertedPeriodBounds {
                min: self.period_min,
                max: self.period_max,
            });
        }
        if self.ttl_divisor == 0 {
            return Err(ConfigError::ZeroDivisor);
        }
        Ok(())
    }
}

/// Sweep settings and runtime shared by every shard of one store.
#[derive(Debug)]
pub(crate) struct SweepContext {
    pub config: InvalidatorConfig,
    /// Resolved when the store is built
    runtime: Option<Handle>,
    /// Set once the missing-runtime warning has been logged
    warned: AtomicBool,
}

impl SweepContext {
    /// Pins `runtime`, or else the runtime the caller is running in, for
    /// every sweeper this store will ever start.
    pub fn new(config: InvalidatorConfig, runtime: Option<Handle>) -> Arc<Self> {
        Arc::new(Self {
            config,
            runtime: runtime.or_else(|| Handle::try_current().ok()),
            warned: AtomicBool::new(false),
        })
    }

    /// Runtime to spawn sweepers on. A store built outside any runtime
    /// falls back to the runtime of the thread starting the sweeper.
    pub fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }

    /// Logs the missing-runtime warning once per store.
    pub fn warn_no_runtime(&self, slot: usize) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                slot = slot,
                "No tokio runtime available, shard invalidators not started"
            );
        }
    }
}

/// Spawns the sweep loop for `shard` onto `runtime`.
///
/// The task holds its own `Arc` to the shard and stops once the shard's
/// shutdown signal is raised.
pub(crate) fn spawn_invalidator<V>(
    runtime: &Handle,
    shard: Arc<Shard<V>>,
    period: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    runtime.spawn(invalidator_loop(shard, period, shutdown_rx))
}

#[inline]
fn is_shutdown(shutdown_rx: &watch::Receiver<bool>) -> bool {
    *shutdown_rx.borrow()
}

/// Sleeps for `delay` unless shutdown comes first. Returns `true` on shutdown.
async fn wait_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if is_shutdown(shutdown_rx) {
        return true;
    }
    tokio::select! {
        _ = time::sleep(delay) => is_shutdown(shutdown_rx),
        result = shutdown_rx.changed() => result.is_err() || is_shutdown(shutdown_rx),
    }
}

/// The main sweeper loop.
async fn invalidator_loop<V>(
    shard: Arc<Shard<V>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    V: Send + Sync + 'static,
{
    let slot = shard.slot();
    debug!(
        slot = slot,
        shift_ms = shard.shift().as_millis() as u64,
        period_ms = period.as_millis() as u64,
        "Shard invalidator started"
    );

    if !wait_or_shutdown(shard.shift(), &mut shutdown_rx).await {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || is_shutdown(&shutdown_rx) {
                        break;
                    }
                    continue;
                }
            }

            if shard.is_closed() || is_shutdown(&shutdown_rx) {
                break;
            }

            let removed = shard.invalidate();
            if removed > 0 {
                debug!(
                    slot = slot,
                    removed = removed,
                    remaining = shard.len(),
                    "Expired keys swept"
                );
            } else {
                trace!(slot = slot, "Sweep found no expired keys");
            }
        }
    }

    debug!(slot = slot, "Shard invalidator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> InvalidatorConfig {
        InvalidatorConfig {
            stagger: Duration::from_millis(5),
            period_min: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_period_is_clamped() {
        let config = InvalidatorConfig::default();

        assert_eq!(config.period_for(Duration::from_secs(5)), Duration::from_secs(1));
        assert_eq!(config.period_for(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(config.period_for(Duration::from_secs(86_400)), Duration::from_secs(600));
    }

    #[test]
    fn test_shift_grows_with_slot() {
        let config = InvalidatorConfig::default();

        assert_eq!(config.shift_for(0), Duration::from_millis(100));
        assert_eq!(config.shift_for(36), Duration::from_millis(3700));
    }

    #[test]
    fn test_zero_ttl_sweeps_at_minimum_period() {
        let config = InvalidatorConfig::default();
        assert_eq!(config.period_for(Duration::ZERO), config.period_min);
    }

    #[test]
    fn test_context_without_runtime() {
        let sweep = SweepContext::new(InvalidatorConfig::default(), None);
        assert!(sweep.runtime().is_none());

        sweep.warn_no_runtime(0);
        sweep.warn_no_runtime(1);
        assert!(sweep.warned.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_context_pins_build_time_runtime() {
        let sweep = SweepContext::new(InvalidatorConfig::default(), None);

        // Resolved from a thread that has no runtime of its own
        let resolved = std::thread::spawn(move || sweep.runtime().is_some())
            .join()
            .unwrap();
        assert!(resolved);
    }

    #[test]
    fn test_validate() {
        assert!(InvalidatorConfig::default().validate().is_ok());

        let inverted = InvalidatorConfig {
            period_min: Duration::from_secs(2),
            period_max: Duration::from_secs(1),
            ..Default::default()
        };
        assert_eq!(
            inverted.validate(),
            Err(ConfigError::InvertedPeriodBounds {
                min: Duration::from_secs(2),
                max: Duration::from_secs(1),
            })
        );

        let zero_div = InvalidatorConfig {
            ttl_divisor: 0,
            ..Default::default()
        };
        assert_eq!(zero_div.validate(), Err(ConfigError::ZeroDivisor));

        let zero_min = InvalidatorConfig {
            period_min: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(zero_min.validate(), Err(ConfigError::ZeroPeriodMin));

        let zero_stagger = InvalidatorConfig {
            stagger: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(zero_stagger.validate(), Err(ConfigError::ZeroStagger));
    }

    #[tokio::test]
    async fn test_invalidator_sweeps_expired_keys() {
        let config = fast_config();
        let sweep = SweepContext::new(config.clone(), None);
        let shard: Arc<Shard<String>> = Shard::new(
            0,
            Some(Duration::from_millis(30)),
            config.shift_for(0),
            &sweep,
        );

        for i in 0..10 {
            shard.set(format!("key{}", i), "value".to_string());
        }
        shard.set_with_ttl("persistent".to_string(), "value".to_string(), Duration::from_secs(3600));
        assert_eq!(shard.len(), 11);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(shard.len(), 1);
        assert_eq!(shard.get("persistent"), Some("value".to_string()));
        assert_eq!(shard.expired_count(), 10);

        shard.close();
    }

    #[tokio::test]
    async fn test_invalidator_stops_on_close() {
        let config = fast_config();
        let sweep = SweepContext::new(config.clone(), None);
        let shard: Arc<Shard<String>> = Shard::new(
            0,
            Some(Duration::from_millis(30)),
            config.shift_for(0),
            &sweep,
        );
        assert!(shard.is_started());

        let (tx, rx) = watch::channel(false);
        let handle = spawn_invalidator(&Handle::current(), Arc::clone(&shard), config.period_min, rx);

        tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Invalidator should exit on shutdown");

        shard.close();
        // The shard's own invalidator drops its Arc once it observes close
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&shard), 1);
    }
}
