//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from one shard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cache::Shard;
use crate::clock::{saturating_deadline, Clock};

/// Offset of a shard's first sweep relative to the client's start.
///
/// Shard `i` of `n` first wakes after `interval * (i + 1) / n`, spreading the
/// shards evenly over one interval instead of waking them all at once.
pub fn sweep_phase(interval: Duration, shard_index: usize, num_shards: usize) -> Duration {
    let num_shards = num_shards.max(1) as u128;
    let slot = (shard_index as u128 % num_shards) + 1;
    let nanos = interval.as_nanos();
    // Split to stay in range for intervals up to `Duration::MAX`.
    duration_from_nanos(nanos / num_shards * slot + nanos % num_shards * slot / num_shards)
}

/// First tick on the grid `deadline + k * interval` that lies after `now`.
///
/// Missed ticks are skipped, but the shard keeps its phase so staggered
/// sweepers stay apart after a clock jump or a slow sweep.
pub fn next_tick(deadline: Instant, now: Instant, interval: Duration) -> Instant {
    let next = saturating_deadline(deadline, interval);
    if next > now {
        return next;
    }
    let interval_nanos = interval.as_nanos().max(1);
    let missed = now.duration_since(next).as_nanos() / interval_nanos + 1;
    saturating_deadline(next, duration_from_nanos(interval_nanos.saturating_mul(missed)))
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Spawns the sweep loop for `shard` on `runtime`.
///
/// The first tick fires `phase` after the clock's current time, then every
/// `interval`. Ticks missed because the clock jumped ahead are skipped rather
/// than replayed, see [`next_tick`]. The loop exits when `stop` flips to `true` or its sender
/// is dropped.
///
/// # Arguments
/// * `runtime` - Runtime to spawn the task on
/// * `shard` - Shard to sweep
/// * `clock` - Time source the task parks on
/// * `interval` - Period between sweeps
/// * `phase` - Delay before the first sweep, see [`sweep_phase`]
/// * `stop` - Shutdown signal shared by all sweepers of a client
///
/// # Returns
/// A JoinHandle for the spawned task.
pub fn spawn_sweep_task<V>(
    runtime: &Handle,
    shard: Arc<Shard<V>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    phase: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    let mut deadline = saturating_deadline(clock.now(), phase);

    runtime.spawn(async move {
        trace!(
            "Starting expiry sweep for shard {} with interval of {:?}",
            shard.index(),
            interval
        );

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = clock.sleep_until(deadline) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let removed = shard.sweep_expired();
            if removed > 0 {
                debug!(
                    shard = shard.index(),
                    removed, "Expiry sweep: removed {} expired entries", removed
                );
            } else {
                trace!(shard = shard.index(), "Expiry sweep: no expired entries found");
            }

            deadline = next_tick(deadline, clock.now(), interval);
        }

        debug!("Expiry sweep for shard {} stopped", shard.index());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::metrics::NoopMetrics;

    const TTL: Duration = Duration::from_secs(60);
    const INTERVAL: Duration = Duration::from_secs(1);

    fn shard_with(clock: Arc<TestClock>) -> Arc<Shard<String>> {
        Arc::new(Shard::new(0, 100, 10, TTL, clock, Arc::new(NoopMetrics)))
    }

    async fn yield_to_sweepers() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_sweep_phase_staggers_shards() {
        let phases: Vec<Duration> = (0..4).map(|i| sweep_phase(INTERVAL, i, 4)).collect();
        assert_eq!(
            phases,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750),
                Duration::from_secs(1),
            ]
        );
        assert_eq!(sweep_phase(INTERVAL, 0, 1), INTERVAL);
        assert_eq!(sweep_phase(Duration::MAX, 0, 1), Duration::MAX);
    }

    #[test]
    fn test_next_tick_keeps_phase_after_missed_ticks() {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(250);

        assert_eq!(
            next_tick(deadline, deadline, INTERVAL),
            start + Duration::from_millis(1250)
        );
        // Ten seconds late: skip to the next point on the same grid.
        assert_eq!(
            next_tick(deadline, start + Duration::from_secs(10), INTERVAL),
            start + Duration::from_millis(10_250)
        );
        // Landing exactly on a grid point moves past it.
        assert_eq!(
            next_tick(deadline, start + Duration::from_millis(3250), INTERVAL),
            start + Duration::from_millis(4250)
        );
    }

    #[test]
    fn test_next_tick_saturates_huge_intervals() {
        let start = Instant::now();
        assert!(next_tick(start, start, Duration::MAX) > start + Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let shard = shard_with(clock.clone());
        shard.set("expire_soon".to_string(), "value".to_string());

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard.clone(),
            clock.clone(),
            INTERVAL,
            INTERVAL,
            stop_rx,
        );

        clock.add(TTL);
        yield_to_sweepers().await;

        assert!(shard.is_empty(), "Expired entry should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let shard = shard_with(clock.clone());
        shard.set("long_lived".to_string(), "value".to_string());

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard.clone(),
            clock.clone(),
            INTERVAL,
            INTERVAL,
            stop_rx,
        );

        for _ in 0..5 {
            clock.add(INTERVAL);
            yield_to_sweepers().await;
        }

        assert_eq!(shard.get("long_lived"), Some("value".to_string()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_waits_for_its_phase() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        // Zero TTL: every entry is expired as soon as it is written.
        let shard = Arc::new(Shard::new(
            0,
            100,
            10,
            Duration::ZERO,
            clock.clone(),
            Arc::new(NoopMetrics),
        ));

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard.clone(),
            clock.clone(),
            INTERVAL,
            Duration::from_millis(500),
            stop_rx,
        );

        shard.set("key".to_string(), "value".to_string());
        clock.add(Duration::from_millis(400));
        yield_to_sweepers().await;
        assert_eq!(shard.len(), 1, "first tick is still 100ms away");

        clock.add(Duration::from_millis(100));
        yield_to_sweepers().await;
        assert!(shard.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_staggered_sweepers_stay_apart_after_clock_jump() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let zero_ttl_shard = |index: usize| -> Arc<Shard<String>> {
            Arc::new(Shard::new(
                index,
                100,
                10,
                Duration::ZERO,
                clock.clone(),
                Arc::new(NoopMetrics),
            ))
        };
        let early = zero_ttl_shard(0);
        let late = zero_ttl_shard(1);

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handles = [
            (early.clone(), Duration::from_millis(250)),
            (late.clone(), Duration::from_millis(500)),
        ]
        .map(|(shard, phase)| {
            spawn_sweep_task(
                &Handle::current(),
                shard,
                clock.clone(),
                INTERVAL,
                phase,
                stop_rx.clone(),
            )
        });

        // Both sweepers miss nine ticks.
        clock.add(Duration::from_secs(10));
        yield_to_sweepers().await;

        early.set("key".to_string(), "value".to_string());
        late.set("key".to_string(), "value".to_string());

        clock.add(Duration::from_millis(300));
        yield_to_sweepers().await;
        assert!(early.is_empty(), "early shard sweeps at +10.25s");
        assert_eq!(late.len(), 1, "late shard waits for +10.5s");

        clock.add(Duration::from_millis(250));
        yield_to_sweepers().await;
        assert!(late.is_empty());

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_sweep_task_with_max_interval_starts_and_stops() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let shard = shard_with(clock.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard,
            clock,
            Duration::MAX,
            sweep_phase(Duration::MAX, 0, 1),
            stop_rx,
        );

        yield_to_sweepers().await;
        stop_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_task_stops_on_signal() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let shard = shard_with(clock.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard,
            clock,
            INTERVAL,
            INTERVAL,
            stop_rx,
        );

        stop_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_task_stops_when_sender_dropped() {
        let clock = Arc::new(TestClock::new(Instant::now()));
        let shard = shard_with(clock.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweep_task(
            &Handle::current(),
            shard,
            clock,
            INTERVAL,
            INTERVAL,
            stop_rx,
        );

        drop(stop_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
