//! Error types for store construction.
//!
//! Store operations themselves never fail: every call on a live or closed
//! store degrades to a no-op or an empty result. Only configuration can be
//! rejected.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating a [`StoreConfig`](crate::StoreConfig).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The stagger between shard sweeps must be non-zero
    #[error("invalidator stagger must be non-zero")]
    ZeroStagger,

    /// The minimum sweep period must be non-zero
    #[error("minimum sweep period must be non-zero")]
    ZeroPeriodMin,

    /// `period_min` is greater than `period_max`
    #[error("sweep period bounds are inverted: min {min:?} > max {max:?}")]
    InvertedPeriodBounds { min: Duration, max: Duration },

    /// The TTL-to-period divisor must be non-zero
    #[error("ttl divisor must be non-zero")]
    ZeroDivisor,

    /// Profile name did not match any known profile
    #[error("unknown sharding profile: {0}")]
    UnknownProfile(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
