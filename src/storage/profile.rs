//! Sharding Profiles
//!
//! A profile decides which classifier slots get a dedicated shard and which
//! collapse onto one shared overflow shard.
//!
//! ```text
//!   Uniform:  [0][1]..[9][a][b]..[z][?]      37 physical shards
//!   Uuid:     [0][1]..[9][a]..[f][ g .. ? ]  17 physical shards
//!   Numeric:  [0][1]..[9][ a   ..      ? ]   11 physical shards
//!                                  └─ one shared instance
//! ```
//!
//! Dedicated slots always come first and the shared shard always fills the
//! tail, so once two adjacent slots point at the same shard, every later slot
//! does too. The store relies on this to count each physical shard once.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::ConfigError;
use crate::storage::classifier::{LAST_DIGIT_SLOT, LAST_HEX_SLOT, SLOT_COUNT};
use crate::storage::expiry::SweepContext;
use crate::storage::shard::{finite_ttl, Shard};

/// Key-distribution profile a store is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    /// General alphanumeric keys: one shard per digit, per letter, plus overflow.
    #[default]
    Uniform,
    /// UUID keys: one shard per hex digit; everything else shares one shard.
    Uuid,
    /// Numeric keys: one shard per decimal digit; everything else shares one shard.
    Numeric,
}

impl Profile {
    /// Number of leading slots that get their own shard.
    pub const fn dedicated_slots(self) -> usize {
        match self {
            Profile::Uniform => SLOT_COUNT,
            Profile::Uuid => LAST_HEX_SLOT + 1,
            Profile::Numeric => LAST_DIGIT_SLOT + 1,
        }
    }

    /// Number of physically distinct shards this profile builds.
    pub const fn physical_shards(self) -> usize {
        let dedicated = self.dedicated_slots();
        if dedicated < SLOT_COUNT {
            dedicated + 1
        } else {
            SLOT_COUNT
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Profile::Uniform => "uniform",
            Profile::Uuid => "uuid",
            Profile::Numeric => "numeric",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" | "alphanumeric" => Ok(Profile::Uniform),
            "uuid" => Ok(Profile::Uuid),
            "numeric" => Ok(Profile::Numeric),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Builds the slot array for `config.profile`.
///
/// Slot `i` gets stagger `(i + 1) × stagger`; the shared overflow shard takes
/// the stagger of the first slot it covers. The sweeper runtime is resolved
/// here, once, so shards started later from non-runtime threads still find it.
pub(crate) fn build_shards<V>(config: &StoreConfig) -> Vec<Arc<Shard<V>>>
where
    V: Clone + Send + Sync + 'static,
{
    let ttl = finite_ttl(config.default_ttl);
    let dedicated = config.profile.dedicated_slots();
    let sweep = SweepContext::new(config.invalidator.clone(), config.runtime.clone());
    let mut shared: Option<Arc<Shard<V>>> = None;

    (0..SLOT_COUNT)
        .map(|slot| {
            let new_shard = || {
                Shard::new(slot, ttl, config.invalidator.shift_for(slot), &sweep)
            };
            if slot < dedicated {
                new_shard()
            } else {
                Arc::clone(shared.get_or_insert_with(new_shard))
            }
        })
        .collect()
}
