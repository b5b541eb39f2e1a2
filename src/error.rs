//! Error types for the sharded cache
//!
//! Provides unified error handling using thiserror. Only construction can
//! fail: lookups, inserts and deletes report their outcome through plain
//! `Option`/`bool` results.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Total capacity must be at least one entry
    #[error("Invalid capacity: {0} (must be greater than zero)")]
    InvalidCapacity(usize),

    /// Shard count must be at least one
    #[error("Invalid shard count: {0} (must be greater than zero)")]
    InvalidShardCount(usize),

    /// Eviction percentage must lie within 0..=100
    #[error("Invalid eviction percentage: {0} (must be between 0 and 100)")]
    InvalidEvictionPercentage(u8),

    /// The background sweep period cannot be zero
    #[error("Invalid eviction interval: must be greater than zero")]
    InvalidEvictionInterval,

    /// Continuous eviction needs a tokio runtime to spawn sweep tasks on
    #[error("Continuous eviction requires a running tokio runtime")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
