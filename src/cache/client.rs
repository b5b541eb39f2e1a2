//! Cache Client Module
//!
//! The public facade: routes every key to its owning shard, fans batch
//! operations out one shard at a time, and owns the background sweepers.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::hashing::ShardRouter;
use crate::cache::Shard;
use crate::clock::{Clock, RealClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::metrics::{MetricsRecorder, NoopMetrics};
use crate::tasks::{spawn_sweep_task, sweep_phase};

/// Builds namespaced keys for batch calls: `id -> prefix + id`.
pub fn batch_key_fn(prefix: &str) -> impl Fn(&str) -> String + Clone + Send + Sync + 'static {
    let prefix = prefix.to_string();
    move |id: &str| format!("{prefix}{id}")
}

// == Client Builder ==
/// Collects the constructor options before any shard or task exists.
pub struct ClientBuilder<V> {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> ClientBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            metrics: None,
            _value: PhantomData,
        }
    }

    /// Replaces the wall clock, e.g. with a [`TestClock`](crate::clock::TestClock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sends observations to `metrics` instead of discarding them.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the period of every shard's expiry sweep.
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.config.eviction_interval = Some(interval);
        self
    }

    /// Disables background sweeps; expired entries are then only hidden on read.
    pub fn with_no_continuous_evictions(mut self) -> Self {
        self.config.continuous_eviction = false;
        self
    }

    // == Build ==
    /// Validates the configuration, creates the shards and starts one sweep
    /// task per shard.
    ///
    /// Fails with [`CacheError::NoRuntime`] when continuous eviction is on and
    /// no tokio runtime is available to spawn the sweepers on.
    pub fn build(self) -> Result<Client<V>> {
        let config = self.config;
        config.validate()?;

        let runtime = if config.continuous_eviction {
            Some(Handle::try_current().map_err(|_| CacheError::NoRuntime)?)
        } else {
            None
        };

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(RealClock::new()),
        };
        let metrics: Arc<dyn MetricsRecorder> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoopMetrics),
        };
        let shard_capacity = config.shard_capacity();

        let shards: Vec<Arc<Shard<V>>> = (0..config.num_shards)
            .map(|index| {
                Arc::new(Shard::new(
                    index,
                    shard_capacity,
                    config.eviction_percentage,
                    config.ttl,
                    clock.clone(),
                    metrics.clone(),
                ))
            })
            .collect();

        let (stop, _) = watch::channel(false);
        let eviction_interval = config.effective_eviction_interval();
        let sweepers: Vec<JoinHandle<()>> = match &runtime {
            Some(runtime) => shards
                .iter()
                .map(|shard| {
                    spawn_sweep_task(
                        runtime,
                        shard.clone(),
                        clock.clone(),
                        eviction_interval,
                        sweep_phase(eviction_interval, shard.index(), config.num_shards),
                        stop.subscribe(),
                    )
                })
                .collect(),
            None => Vec::new(),
        };

        info!(
            "Cache client created: capacity={}, shards={}, shard_capacity={}, ttl={:?}, eviction_percentage={}, sweep_interval={:?}, continuous_eviction={}",
            config.capacity,
            config.num_shards,
            shard_capacity,
            config.ttl,
            config.eviction_percentage,
            eviction_interval,
            config.continuous_eviction
        );

        Ok(Client {
            router: ShardRouter::new(shards.len()),
            shards,
            config,
            eviction_interval,
            metrics,
            stop,
            sweepers,
        })
    }
}

// == Client ==
/// A sharded, capacity-bounded key-value cache with TTL expiry.
pub struct Client<V> {
    /// Fixed, ordered shard list
    shards: Vec<Arc<Shard<V>>>,
    router: ShardRouter,
    config: Config,
    eviction_interval: Duration,
    metrics: Arc<dyn MetricsRecorder>,
    /// Flipped to `true` to stop every sweeper
    stop: watch::Sender<bool>,
    sweepers: Vec<JoinHandle<()>>,
}

impl<V> Client<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a client with default clock, metrics and sweep interval.
    ///
    /// # Arguments
    /// * `capacity` - Total entries across all shards, must be non-zero
    /// * `num_shards` - Fixed shard count, must be non-zero
    /// * `ttl` - Lifetime applied to every entry
    /// * `eviction_percentage` - 0-100; 0 turns Set on a full shard into a no-op
    pub fn new(
        capacity: usize,
        num_shards: usize,
        ttl: Duration,
        eviction_percentage: u8,
    ) -> Result<Self> {
        Self::builder(capacity, num_shards, ttl, eviction_percentage).build()
    }

    /// Starts a builder for the optional settings.
    pub fn builder(
        capacity: usize,
        num_shards: usize,
        ttl: Duration,
        eviction_percentage: u8,
    ) -> ClientBuilder<V> {
        ClientBuilder::new(Config {
            capacity,
            num_shards,
            ttl,
            eviction_percentage,
            eviction_interval: None,
            continuous_eviction: true,
        })
    }

    /// Starts a builder from an existing configuration.
    pub fn from_config(config: &Config) -> ClientBuilder<V> {
        ClientBuilder::new(config.clone())
    }

    fn route(&self, key: &str) -> usize {
        let index = self.router.shard_index(key);
        self.metrics.shard_index(index);
        index
    }

    fn shard_for(&self, key: &str) -> &Shard<V> {
        &self.shards[self.route(key)]
    }

    // == Single Key Operations ==
    /// Returns the live value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        self.shard_for(key).get(key)
    }

    /// Stores `value` under `key`.
    ///
    /// Returns `true` if the owning shard had to force an eviction first.
    pub fn set(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        self.shard_for(&key).set(key, value)
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.shard_for(key).delete(key)
    }

    /// Time left before `key` expires, `None` if absent or expired.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.shard_for(key).ttl_remaining(key)
    }

    // == Batch Operations ==
    /// Looks up many keys, locking each involved shard once.
    ///
    /// The result only holds keys that were present and unexpired.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> HashMap<String, V> {
        let mut by_shard: HashMap<usize, Vec<&str>> = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            by_shard.entry(self.route(key)).or_default().push(key);
        }

        let mut found = HashMap::with_capacity(keys.len());
        for (index, keys) in by_shard {
            found.extend(self.shards[index].get_many(keys));
        }
        found
    }

    /// Stores every record, locking each involved shard once.
    ///
    /// Returns `true` if any shard forced an eviction.
    pub fn set_many(&self, records: impl IntoIterator<Item = (String, V)>) -> bool {
        let mut by_shard: HashMap<usize, Vec<(String, V)>> = HashMap::new();
        for (key, value) in records {
            by_shard.entry(self.route(&key)).or_default().push((key, value));
        }

        let mut evicted = false;
        for (index, records) in by_shard {
            evicted |= self.shards[index].set_many(records);
        }
        evicted
    }

    /// Like [`set_many`](Self::set_many), rewriting each key with `key_fn`
    /// before it is hashed and stored.
    pub fn set_many_key_fn<F>(&self, records: impl IntoIterator<Item = (String, V)>, key_fn: F) -> bool
    where
        F: Fn(&str) -> String,
    {
        self.set_many(
            records
                .into_iter()
                .map(|(key, value)| (key_fn(key.as_str()), value)),
        )
    }

    /// See [`batch_key_fn`].
    pub fn batch_key_fn(&self, prefix: &str) -> impl Fn(&str) -> String + Clone + Send + Sync + 'static {
        batch_key_fn(prefix)
    }

    // == Introspection ==
    /// Total entries across shards; each shard is counted under its own lock,
    /// so the sum is not an atomic snapshot.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Keys currently stored in every shard.
    pub fn scan_keys(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|shard| shard.scan_keys())
            .collect()
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_capacity(&self) -> usize {
        self.config.shard_capacity()
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn eviction_interval(&self) -> Duration {
        self.eviction_interval
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // == Shutdown ==
    /// Stops every sweep task and waits for them to finish.
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        for sweeper in self.sweepers.drain(..) {
            let _ = sweeper.await;
        }
        info!("Cache client shut down");
    }
}

impl<V> Drop for Client<V> {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

impl<V> fmt::Debug for Client<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("eviction_interval", &self.eviction_interval)
            .field("sweepers", &self.sweepers.len())
            .finish()
    }
}
