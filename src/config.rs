//! Configuration Module
//!
//! Handles loading, defaulting and validating cache configuration.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Lower bound for a derived sweep interval, so tiny TTLs never spin a sweeper.
const MIN_EVICTION_INTERVAL: Duration = Duration::from_millis(1);

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries across all shards
    pub capacity: usize,
    /// Fixed number of shards
    pub num_shards: usize,
    /// Time-to-live applied to every entry at insertion
    pub ttl: Duration,
    /// Share of a full shard (0-100) evicted per forced eviction; 0 disables it
    pub eviction_percentage: u8,
    /// Background sweep period; `None` derives it from the TTL
    pub eviction_interval: Option<Duration>,
    /// Whether each shard runs a background expiry sweep
    pub continuous_eviction: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Total entry capacity (default: 10000)
    /// - `CACHE_SHARDS` - Number of shards (default: 16)
    /// - `CACHE_TTL_SECS` - Entry TTL in seconds (default: 300)
    /// - `CACHE_EVICTION_PERCENTAGE` - Forced eviction percentage (default: 10)
    /// - `CACHE_EVICTION_INTERVAL_MS` - Sweep period in milliseconds (default: TTL / shards)
    /// - `CACHE_CONTINUOUS_EVICTION` - `true`/`false` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: parse_var("CACHE_CAPACITY").unwrap_or(defaults.capacity),
            num_shards: parse_var("CACHE_SHARDS").unwrap_or(defaults.num_shards),
            ttl: parse_var("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            eviction_percentage: parse_var("CACHE_EVICTION_PERCENTAGE")
                .unwrap_or(defaults.eviction_percentage),
            eviction_interval: parse_var("CACHE_EVICTION_INTERVAL_MS").map(Duration::from_millis),
            continuous_eviction: parse_var("CACHE_CONTINUOUS_EVICTION")
                .unwrap_or(defaults.continuous_eviction),
        }
    }

    // == Validate ==
    /// Checks the parameters the cache cannot operate without.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidCapacity(self.capacity));
        }
        if self.num_shards == 0 {
            return Err(CacheError::InvalidShardCount(self.num_shards));
        }
        if self.eviction_percentage > 100 {
            return Err(CacheError::InvalidEvictionPercentage(
                self.eviction_percentage,
            ));
        }
        if self.eviction_interval == Some(Duration::ZERO) {
            return Err(CacheError::InvalidEvictionInterval);
        }
        Ok(())
    }

    // == Derived Values ==
    /// Per-shard quota: `ceil(capacity / num_shards)`, so quotas cover the total.
    pub fn shard_capacity(&self) -> usize {
        self.capacity.div_ceil(self.num_shards.max(1))
    }

    /// Sweep period, falling back to `ttl / num_shards` when none was given.
    pub fn effective_eviction_interval(&self) -> Duration {
        self.eviction_interval
            .unwrap_or_else(|| default_eviction_interval(self.ttl, self.num_shards))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            num_shards: 16,
            ttl: Duration::from_secs(300),
            eviction_percentage: 10,
            eviction_interval: None,
            continuous_eviction: true,
        }
    }
}

/// Spreads one TTL's worth of time across the shards.
pub fn default_eviction_interval(ttl: Duration, num_shards: usize) -> Duration {
    let shards = u32::try_from(num_shards.max(1)).unwrap_or(u32::MAX);
    (ttl / shards).max(MIN_EVICTION_INTERVAL)
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
