//! Store Configuration
//!
//! Everything a store needs is passed at construction time. There are no
//! environment variables and no config files.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::Result;
use crate::storage::expiry::InvalidatorConfig;
use crate::storage::profile::Profile;

/// Construction parameters for a [`Store`](crate::Store).
///
/// # Example
///
/// ```
/// use ttlshard::{Profile, StoreConfig};
/// use std::time::Duration;
///
/// let config = StoreConfig {
///     profile: Profile::Uuid,
///     default_ttl: Duration::from_secs(30),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Sharding profile (default: uniform)
    pub profile: Profile,

    /// TTL applied by `set`; zero disables expiry (default: zero)
    pub default_ttl: Duration,

    /// Sweep scheduling
    pub invalidator: InvalidatorConfig,

    /// Runtime for the background sweepers. Falls back to the runtime the
    /// store is created in; either way it is resolved once, at build.
    pub runtime: Option<Handle>,
}

impl StoreConfig {
    pub fn new(profile: Profile, default_ttl: Duration) -> Self {
        Self {
            profile,
            default_ttl,
            ..Default::default()
        }
    }

    /// Rejects sweep schedules that could not run.
    pub fn validate(&self) -> Result<()> {
        self.invalidator.validate()
    }
}
