//! Cache Shard Module
//!
//! One independently locked partition of the key space. A shard owns its map,
//! its capacity quota and its forced eviction policy; expiry removal is driven
//! from outside by the background sweeper through `sweep_expired`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::Entry;
use crate::clock::Clock;
use crate::metrics::{EvictionReason, MetricsRecorder};

type EntryMap<V> = HashMap<String, Entry<V>>;

// == Shard ==
/// A capacity-bounded map guarded by its own mutex.
pub struct Shard<V> {
    /// Position of this shard in the client's shard list
    index: usize,
    /// Key-value storage
    entries: Mutex<EntryMap<V>>,
    /// Maximum number of entries this shard holds
    capacity: usize,
    /// Share of `capacity` dropped per forced eviction, 0 disables it
    eviction_percentage: u8,
    /// TTL applied at insertion
    ttl: Duration,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<V> Shard<V> {
    // == Constructor ==
    /// Creates an empty shard.
    ///
    /// # Arguments
    /// * `index` - Position of the shard, used in logs
    /// * `capacity` - Entry quota, must be non-zero
    /// * `eviction_percentage` - 0-100, share of `capacity` evicted when full
    /// * `ttl` - Lifetime given to every inserted entry
    /// * `clock` - Shared time source
    /// * `metrics` - Shared recorder
    pub fn new(
        index: usize,
        capacity: usize,
        eviction_percentage: u8,
        ttl: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            index,
            entries: Mutex::new(HashMap::new()),
            capacity,
            eviction_percentage: eviction_percentage.min(100),
            ttl,
            clock,
            metrics,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped by one forced eviction: `max(1, capacity * pct / 100)`.
    pub fn victim_count(&self) -> usize {
        let pct = usize::from(self.eviction_percentage);
        // Split so `capacity * pct` cannot overflow.
        (self.capacity / 100 * pct + self.capacity % 100 * pct / 100).max(1)
    }

    // == Set ==
    /// Stores a value, returning whether a forced eviction made room for it.
    ///
    /// Existing keys are overwritten in place. A new key in a full shard
    /// first evicts `victim_count()` arbitrary entries; with eviction
    /// disabled the new key is silently dropped instead.
    pub fn set(&self, key: String, value: V) -> bool {
        let mut entries = self.entries.lock();
        let now = self.clock.now();
        self.insert_locked(&mut entries, key, value, now)
    }

    /// Stores every pair under a single lock acquisition.
    ///
    /// Returns `true` if any insert forced an eviction.
    pub fn set_many(&self, items: impl IntoIterator<Item = (String, V)>) -> bool {
        let mut entries = self.entries.lock();
        let now = self.clock.now();
        let mut evicted = false;
        for (key, value) in items {
            evicted |= self.insert_locked(&mut entries, key, value, now);
        }
        evicted
    }

    fn insert_locked(&self, entries: &mut EntryMap<V>, key: String, value: V, now: Instant) -> bool {
        if let Some(existing) = entries.get_mut(&key) {
            *existing = Entry::new(value, now, self.ttl);
            return false;
        }

        let mut evicted = false;
        if entries.len() >= self.capacity {
            if self.eviction_percentage == 0 {
                return false;
            }
            self.force_evict(entries);
            evicted = true;
        }

        entries.insert(key, Entry::new(value, now, self.ttl));
        evicted
    }

    // == Forced Eviction ==
    /// Drops `victim_count()` entries in the map's own iteration order.
    ///
    /// The order is arbitrary rather than recency based; no bookkeeping is
    /// kept per access and nothing is allocated while the lock is held.
    fn force_evict(&self, entries: &mut EntryMap<V>) -> usize {
        let victims = self.victim_count().min(entries.len());
        let mut remaining = victims;
        entries.retain(|_, _| {
            if remaining == 0 {
                return true;
            }
            remaining -= 1;
            false
        });

        self.metrics.forced_eviction();
        self.metrics
            .entries_evicted(EvictionReason::Capacity, victims);
        debug!(
            shard = self.index,
            evicted = victims,
            "Forced eviction: shard {} dropped {} entries",
            self.index,
            victims
        );
        victims
    }

    // == Delete ==
    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    // == Time To Live ==
    /// Time left before `key` expires, `None` if absent or already expired.
    ///
    /// Inspection only: not counted as a hit or a miss.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        let now = self.clock.now();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.ttl_remaining(now))
    }

    // == Size ==
    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    // == Scan Keys ==
    /// Point-in-time copy of every stored key.
    pub fn scan_keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    // == Sweep Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let now = self.clock.now();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        };

        if removed > 0 {
            self.metrics.entries_evicted(EvictionReason::Expired, removed);
        }
        removed
    }
}

impl<V: Clone> Shard<V> {
    // == Get ==
    /// Returns the value for `key` if present and not expired.
    ///
    /// Expired entries are reported as misses but left for the sweeper.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = {
            let entries = self.entries.lock();
            let now = self.clock.now();
            entries
                .get(key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.value.clone())
        };

        match value {
            Some(_) => self.metrics.cache_hit(),
            None => self.metrics.cache_miss(),
        }
        value
    }

    /// Looks up several keys under a single lock acquisition.
    ///
    /// Only live entries are returned.
    pub fn get_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<(String, V)> {
        let entries = self.entries.lock();
        let now = self.clock.now();
        let mut found = Vec::new();
        for key in keys {
            match entries.get(key).filter(|entry| !entry.is_expired(now)) {
                Some(entry) => {
                    self.metrics.cache_hit();
                    found.push((key.to_string(), entry.value.clone()));
                }
                None => self.metrics.cache_miss(),
            }
        }
        found
    }
}

impl<V> fmt::Debug for Shard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("index", &self.index)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("eviction_percentage", &self.eviction_percentage)
            .field("ttl", &self.ttl)
            .finish()
    }
}
