//! Delayer Timer Binary
//!
//! Standalone daemon that runs the promotion timer against Redis: on every
//! interval it moves expired delayed jobs onto their per-topic ready queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;

use delayer_core::config::DelayerConfig;
use delayer_core::logging::init_structured_logging;
use delayer_core::promotion::{PromotionPipeline, PromotionTimer};
use delayer_core::reporter::TracingReporter;
use delayer_core::store::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    info!("Starting delayer promotion timer");

    let config = DelayerConfig::load()?;

    let store = Arc::new(RedisStore::from_config(&config.redis)?);
    // Fail fast on an unreachable store instead of erroring every tick.
    store.ping().await?;
    info!(url = %config.redis.redacted_url(), "Connected to Redis");

    let pipeline = Arc::new(PromotionPipeline::new(
        Arc::clone(&store),
        Arc::new(TracingReporter),
        &config.timer,
    ));
    let timer = PromotionTimer::new(pipeline, config.timer.interval());

    timer.start();
    info!(
        interval_ms = config.timer.interval_ms,
        "Promotion timer running, waiting for shutdown signal"
    );

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    timer.stop();
    // Give in-flight passes a moment to finish before the runtime drops.
    tokio::time::sleep(Duration::from_millis(250)).await;
    info!("Delayer promotion timer stopped");

    Ok(())
}
