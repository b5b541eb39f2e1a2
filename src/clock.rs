//! Clock Module
//!
//! Time source used for entry expiry and for parking the background sweepers.
//! `RealClock` follows wall time; `TestClock` only moves when told to, which
//! makes expiry and sweep behaviour deterministic in tests.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

// == Clock Trait ==
/// Capability providing the current time and timer parking.
///
/// Shared by every shard and sweeper, so implementations must be safe to call
/// concurrently without any external locking.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Completes once `now()` has reached `deadline`.
    async fn sleep_until(&self, deadline: Instant);
}

/// Offset used in place of a duration too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + offset`, clamped to about thirty years out instead of overflowing.
///
/// Lets `Duration::MAX` stand for "never expires" as a TTL or sweep interval.
pub fn saturating_deadline(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

// == Real Clock ==
/// Clock backed by the monotonic system clock and tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

// == Test Clock ==
/// Manually advanced clock.
///
/// The current time lives in a watch channel: every `add`/`set` publishes the
/// new time, and each parked `sleep_until` re-checks its deadline on change.
pub struct TestClock {
    time: watch::Sender<Instant>,
}

impl TestClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Instant) -> Self {
        let (time, _) = watch::channel(start);
        Self { time }
    }

    /// Moves time forward by `duration`, releasing sleepers whose deadline passed.
    pub fn add(&self, duration: Duration) {
        self.time.send_modify(|now| *now += duration);
    }

    /// Jumps to `time`. Moving backwards is allowed but never wakes anyone.
    pub fn set(&self, time: Instant) {
        self.time.send_replace(time);
    }
}

impl fmt::Debug for TestClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClock")
            .field("now", &*self.time.borrow())
            .finish()
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.time.borrow()
    }

    async fn sleep_until(&self, deadline: Instant) {
        let mut rx = self.time.subscribe();
        loop {
            let reached = *rx.borrow_and_update() >= deadline;
            if reached {
                return;
            }
            // The sender lives as long as `self`, so this only fails on teardown.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
