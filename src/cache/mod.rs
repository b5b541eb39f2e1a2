//! Cache Module
//!
//! Sharded in-memory storage with TTL expiration and forced eviction.

mod client;
mod entry;
pub mod hashing;
mod shard;


// Re-export public types
pub use client::{batch_key_fn, Client, ClientBuilder};
pub use entry::Entry;
pub use shard::Shard;
