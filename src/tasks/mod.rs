//! Background Tasks Module
//!
//! Contains the tasks that run alongside a client for its whole lifetime.
//!
//! # Tasks
//! - Expiry sweep: one per shard, removes expired entries at a fixed interval

mod sweep;

pub use sweep::{next_tick, spawn_sweep_task, sweep_phase};
