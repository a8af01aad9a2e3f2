//! Mini Cache - Demo workload
//!
//! Runs a bounded TTL store behind a coalescing read-through cache and
//! drives it with concurrent readers until Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::decorators::loader_fn;
use mini_cache::{BoundedStore, Cache, Config, Context, ReadThroughCache};

// == Workload Parameters ==
const WORKERS: u64 = 8;
const KEYSPACE: u64 = 64;
const LOAD_LATENCY: Duration = Duration::from_millis(25);
const REQUEST_PAUSE: Duration = Duration::from_millis(5);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Cache demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, sweep_interval={}ms, load_timeout={}ms",
        config.max_entries, config.default_ttl, config.sweep_interval_ms, config.load_timeout_ms
    );

    let store: Arc<BoundedStore<String>> = Arc::new(BoundedStore::from_config(&config));
    let loader = loader_fn(|_ctx: Context, key: String| async move {
        tokio::time::sleep(LOAD_LATENCY).await;
        Ok(format!("value-of-{}", key))
    });
    let cache = Arc::new(ReadThroughCache::from_config(
        store.clone(),
        Arc::new(loader),
        &config,
    ));
    info!("Cache stack initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<JoinHandle<()>> = (0..WORKERS)
        .map(|worker| spawn_worker(worker, cache.clone(), shutdown_rx.clone()))
        .collect();
    handles.push(spawn_reporter(store.clone(), shutdown_rx));
    info!(workers = WORKERS, keyspace = KEYSPACE, "Workload started");

    shutdown_signal().await;
    shutdown_tx
        .send(true)
        .context("all workload tasks exited before shutdown")?;

    for handle in handles {
        handle.await.context("workload task panicked")?;
    }

    let stats = store.stats();
    info!(
        "Final stats: {}",
        serde_json::to_string(&stats).context("failed to serialize stats")?
    );
    store.close();
    info!("Mini Cache demo shutdown complete");
    Ok(())
}

// == Workload ==
/// Issues reads over the shared keyspace, deleting a key now and then so
/// it has to be loaded again.
fn spawn_worker(
    worker: u64,
    cache: Arc<ReadThroughCache<String>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut request: u64 = 0;
        loop {
            let key = format!("key:{}", (worker * 7 + request * 13) % KEYSPACE);
            let ctx = Context::with_timeout(Duration::from_secs(1));

            if request % 50 == 49 {
                if let Err(err) = cache.delete(&ctx, &key).await {
                    warn!(worker, key = %key, error = %err, "Delete failed");
                }
            } else {
                match cache.get(&ctx, &key).await {
                    Ok(value) => debug!(worker, key = %key, value = %value, "Read"),
                    Err(err) => warn!(worker, key = %key, error = %err, "Read failed"),
                }
            }
            request += 1;

            tokio::select! {
                _ = tokio::time::sleep(REQUEST_PAUSE) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!(worker, requests = request, "Worker stopped");
    })
}

/// Logs a stats snapshot every `STATS_INTERVAL`.
fn spawn_reporter(
    store: Arc<BoundedStore<String>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = store.stats();
                    match serde_json::to_string(&stats) {
                        Ok(json) => info!(
                            live = store.live_count(),
                            hit_rate = stats.hit_rate(),
                            "Stats: {}",
                            json
                        ),
                        Err(err) => warn!(error = %err, "Failed to serialize stats"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
