//! blqueue - Load driver for the balanced queue
//! Runs one queue under a bursty synthetic workload and logs its status.

use anyhow::Result;
use blqueue_core::port::{processor_fn, LogMetrics};
use blqueue_core::{Config, Queue, QueueSettings};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_KEY: &str = "blqueue";
const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_WORKERS_MAX: usize = 4;
const DEFAULT_PRODUCERS: usize = 4;
const DEFAULT_WORK_MS: u64 = 5;
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

fn env_or<V: std::str::FromStr>(name: &str, default: V) -> V {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("BLQUEUE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("blqueue=info,blqueue_core=info"))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("blqueue v{} starting...", VERSION);

    // 2. Load configuration
    let mut settings = QueueSettings::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid queue settings: {}", e))?;
    if settings.key.is_none() {
        settings.key = Some(DEFAULT_KEY.to_string());
    }
    if settings.capacity == 0 {
        settings.capacity = DEFAULT_CAPACITY;
    }
    if settings.workers == 0 && settings.workers_max == 0 {
        settings.workers_max = DEFAULT_WORKERS_MAX;
    }

    let producers: usize = env_or("BLQUEUE_PRODUCERS", DEFAULT_PRODUCERS);
    let work_ms: u64 = env_or("BLQUEUE_WORK_MS", DEFAULT_WORK_MS);
    let run_secs: u64 = env_or("BLQUEUE_RUN_SECS", 0);

    let key = settings.key.clone().unwrap_or_default();

    // 3. Wire the queue
    let processor = processor_fn(move |_item: u64| async move {
        let jitter = rand::thread_rng().gen_range(0..=work_ms);
        tokio::time::sleep(Duration::from_millis(work_ms + jitter)).await;
    });

    let config = Config::<u64>::from_settings(settings)
        .processor(Arc::new(processor))
        .metrics(Arc::new(LogMetrics::new(key)));

    let queue = Arc::new(
        Queue::start(config)
            .await
            .map_err(|e| anyhow::anyhow!("Queue start failed: {}", e))?,
    );
    info!(snapshot = %queue, "Queue started");

    // 4. Start producers: bursts of work separated by idle pauses
    let mut producer_handles = Vec::with_capacity(producers);
    for producer in 0..producers {
        let queue = Arc::clone(&queue);
        producer_handles.push(tokio::spawn(async move {
            let mut next: u64 = 0;
            loop {
                let (burst, pause_ms) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen_range(1..=200u64), rng.gen_range(10..=500u64))
                };
                for _ in 0..burst {
                    if queue.enqueue(next).await.is_err() {
                        info!(producer, "Queue closed, producer exiting");
                        return;
                    }
                    next += 1;
                }
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;
            }
        }));
    }

    // 5. Periodic status report
    let reporter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(STATUS_INTERVAL);
            loop {
                tick.tick().await;
                info!(
                    status = %queue.status(),
                    active = queue.active_workers(),
                    buffered = queue.len(),
                    passes = queue.rebalance_count(),
                    "Queue status"
                );
            }
        })
    };

    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal (or the configured run time)
    if run_secs > 0 {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = tokio::time::sleep(Duration::from_secs(run_secs)) => {
                info!(run_secs, "Run time elapsed");
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    reporter.abort();
    if let Err(e) = queue.shutdown().await {
        warn!(error = %e, "Queue shutdown failed");
    }
    for handle in producer_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!(snapshot = %queue, "Shutdown complete.");

    Ok(())
}
