//! Metrics Module
//!
//! Instrumentation hooks for hits, misses, evictions and shard placement.
//! The cache always calls through a `MetricsRecorder`; the default
//! `NoopMetrics` keeps the hot path free of "are metrics on" branches.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Eviction Reason ==
/// Why entries left the cache without being deleted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Removed by a shard's background sweep after the TTL elapsed
    Expired,
    /// Removed to make room for a new key in a full shard
    Capacity,
}

// == Recorder Trait ==
/// Receives cache observations from any shard, concurrently.
///
/// Every method defaults to doing nothing, so recorders only implement what
/// they care about.
pub trait MetricsRecorder: Send + Sync {
    /// A lookup found a live entry.
    fn cache_hit(&self) {}

    /// A lookup found nothing, or only an expired entry.
    fn cache_miss(&self) {}

    /// `count` entries were removed for `reason`.
    fn entries_evicted(&self, _reason: EvictionReason, _count: usize) {}

    /// One forced eviction episode happened.
    fn forced_eviction(&self) {}

    /// A key was routed to shard `index`.
    fn shard_index(&self, _index: usize) {}
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {}

// == Counter Metrics ==
/// Lock-free counting recorder.
#[derive(Debug)]
pub struct CounterMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    ttl_evictions: AtomicU64,
    forced_evictions: AtomicU64,
    forced_eviction_episodes: AtomicU64,
    shard_placements: Box<[AtomicU64]>,
}

impl CounterMetrics {
    // == Constructor ==
    /// Creates a recorder tracking placement across `num_shards` shards.
    pub fn new(num_shards: usize) -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl_evictions: AtomicU64::new(0),
            forced_evictions: AtomicU64::new(0),
            forced_eviction_episodes: AtomicU64::new(0),
            shard_placements: (0..num_shards).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries removed for either reason.
    pub fn evicted_entries(&self) -> u64 {
        self.ttl_evictions.load(Ordering::Relaxed) + self.forced_evictions.load(Ordering::Relaxed)
    }

    pub fn forced_eviction_episodes(&self) -> u64 {
        self.forced_eviction_episodes.load(Ordering::Relaxed)
    }

    /// Number of keys routed to each shard, indexed by shard.
    pub fn shard_distribution(&self) -> Vec<u64> {
        self.shard_placements
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect()
    }

    // == Distribution ==
    /// Largest relative deviation of any shard from the mean placement count.
    ///
    /// Returns 0.0 when nothing has been routed yet.
    pub fn max_shard_deviation(&self) -> f64 {
        let counts = self.shard_distribution();
        let total: u64 = counts.iter().sum();
        if counts.is_empty() || total == 0 {
            return 0.0;
        }
        let mean = total as f64 / counts.len() as f64;
        counts
            .iter()
            .map(|&count| (count as f64 - mean).abs() / mean)
            .fold(0.0, f64::max)
    }

    // == Snapshot ==
    /// Creates a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        let lookups = hits + misses;

        MetricsSnapshot {
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            ttl_evictions: self.ttl_evictions.load(Ordering::Relaxed),
            forced_evictions: self.forced_evictions.load(Ordering::Relaxed),
            forced_eviction_episodes: self.forced_eviction_episodes(),
            shard_distribution: self.shard_distribution(),
        }
    }
}

impl MetricsRecorder for CounterMetrics {
    fn cache_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn entries_evicted(&self, reason: EvictionReason, count: usize) {
        let counter = match reason {
            EvictionReason::Expired => &self.ttl_evictions,
            EvictionReason::Capacity => &self.forced_evictions,
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn forced_eviction(&self) {
        self.forced_eviction_episodes.fetch_add(1, Ordering::Relaxed);
    }

    fn shard_index(&self, index: usize) {
        if let Some(count) = self.shard_placements.get(index) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// == Snapshot ==
/// Serializable view of a `CounterMetrics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before any lookup
    pub hit_rate: f64,
    /// Entries removed by background sweeps
    pub ttl_evictions: u64,
    /// Entries removed by forced evictions
    pub forced_evictions: u64,
    /// Number of forced eviction episodes
    pub forced_eviction_episodes: u64,
    /// Keys routed to each shard
    pub shard_distribution: Vec<u64>,
}
