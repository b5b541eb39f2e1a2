//! Shard Cache - An in-process sharded key-value cache
//!
//! Keeps memory bounded with two independent mechanisms: a per-shard
//! background sweep that drops expired entries, and forced eviction that
//! makes room when a shard is full.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tasks;

pub use cache::{batch_key_fn, Client, ClientBuilder};
pub use clock::{Clock, RealClock, TestClock};
pub use config::Config;
pub use error::{CacheError, Result};
pub use metrics::{CounterMetrics, EvictionReason, MetricsRecorder, MetricsSnapshot, NoopMetrics};
