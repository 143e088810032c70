//! Interval driver for promotion passes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::promotion::PromotionPipeline;
use crate::store::DelayStore;

/// Fires one promotion pass per interval on a background task.
///
/// The first tick lands one full interval after [`start`](Self::start);
/// there is no immediate pass on startup. Each tick spawns its pass without
/// awaiting the previous one, so a slow store never delays the cadence.
/// Overlapping passes are safe because the store transaction makes the
/// promotion of any individual job effective exactly once.
pub struct PromotionTimer<S: DelayStore> {
    pipeline: Arc<PromotionPipeline<S>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    /// Bumped on every start; a loop whose epoch no longer matches exits at
    /// its next wakeup, even if it missed the stop notification.
    epoch: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
}

impl<S: DelayStore> PromotionTimer<S> {
    pub fn new(pipeline: Arc<PromotionPipeline<S>>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawn the tick loop. Calling this while the timer is already running
    /// is a no-op; calling it after [`stop`](Self::stop) starts a fresh loop
    /// and retires any previous one.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Promotion timer is already running");
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting promotion timer"
        );
        tokio::spawn(Self::tick_loop(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.running),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.epoch),
            epoch,
            self.interval,
        ));
    }

    /// Halt future ticks. Passes already in flight run to completion.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping promotion timer");
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn tick_loop(
        pipeline: Arc<PromotionPipeline<S>>,
        running: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        epoch: Arc<AtomicU64>,
        loop_epoch: u64,
        period: Duration,
    ) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !running.load(Ordering::SeqCst)
                        || epoch.load(Ordering::SeqCst) != loop_epoch
                    {
                        break;
                    }
                    let pipeline = Arc::clone(&pipeline);
                    tokio::spawn(async move {
                        match pipeline.run_pass().await {
                            Ok(summary) => debug!(
                                fetched = summary.fetched,
                                promoted = summary.promoted_jobs,
                                "Timed promotion pass finished"
                            ),
                            // Already routed through the reporter; just trace.
                            Err(error) => debug!(%error, "Timed promotion pass aborted"),
                        }
                    });
                }
                _ = shutdown.notified() => {
                    if !running.load(Ordering::SeqCst)
                        || epoch.load(Ordering::SeqCst) != loop_epoch
                    {
                        debug!("Shutdown notification received");
                        break;
                    }
                    // A stop superseded by a restart; this loop is current.
                }
            }
        }

        info!("Promotion timer loop exited");
    }
}

impl<S: DelayStore> fmt::Debug for PromotionTimer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromotionTimer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
