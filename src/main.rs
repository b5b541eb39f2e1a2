//! Shard Cache - workload driver
//!
//! Runs a concurrent read/write workload against a cache built from the
//! environment and prints a JSON report of what the cache observed.

use std::env;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shard_cache::{Client, Config, CounterMetrics, MetricsSnapshot};

/// Final report printed to stdout.
#[derive(Debug, Serialize)]
struct WorkloadReport {
    timestamp: String,
    elapsed_ms: u128,
    workers: usize,
    ops_per_worker: usize,
    final_size: usize,
    forced_evictions_seen: usize,
    metrics: MetricsSnapshot,
}

/// Main entry point for the workload driver.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache configuration from environment variables
/// 3. Build the client and its sweepers
/// 4. Run `WORKLOAD_WORKERS` writer/reader tasks of `WORKLOAD_OPS` operations each
/// 5. Print the report and shut the sweepers down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let workers = env_or("WORKLOAD_WORKERS", 4);
    let ops_per_worker = env_or("WORKLOAD_OPS", 100_000);
    info!(
        "Configuration loaded: capacity={}, shards={}, ttl={:?}, eviction_percentage={}, workers={}, ops={}",
        config.capacity,
        config.num_shards,
        config.ttl,
        config.eviction_percentage,
        workers,
        ops_per_worker
    );

    let metrics = Arc::new(CounterMetrics::new(config.num_shards));
    let client: Arc<Client<String>> = Arc::new(
        Client::from_config(&config)
            .with_metrics(metrics.clone())
            .build()
            .context("invalid cache configuration")?,
    );

    // Each worker writes twice the per-worker share of capacity worth of keys,
    // so a default run exercises forced eviction as well as hits.
    let keyspace = config.capacity.max(1) * 2;
    let started = Instant::now();
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut evictions = 0;
            for op in 0..ops_per_worker {
                let key = format!("key-{}", (op * 7919 + worker * 104_729) % keyspace);
                if op % 4 == 0 {
                    if client.set(key, format!("value-{op}")) {
                        evictions += 1;
                    }
                } else {
                    client.get(&key);
                }
                if op % 1024 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            evictions
        }));
    }

    let mut forced_evictions_seen = 0;
    for handle in handles {
        forced_evictions_seen += handle.await.context("worker panicked")?;
    }

    let report = WorkloadReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        elapsed_ms: started.elapsed().as_millis(),
        workers,
        ops_per_worker,
        final_size: client.size(),
        forced_evictions_seen,
        metrics: metrics.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown().await,
        Err(_) => info!("Client still shared, sweepers stop on drop"),
    }
    info!("Workload complete");
    Ok(())
}

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
