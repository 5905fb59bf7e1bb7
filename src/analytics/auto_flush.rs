//! Periodic flushing on the tokio runtime.

use super::aggregator::AnalyticsAggregator;
use super::sink::FlushOutcome;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Background task flushing an aggregator every `flush_interval`, and early
/// whenever a batch fills up.
///
/// Flushes run on the blocking pool so a slow sink never stalls the runtime.
/// [`AutoFlush::stop`] performs one last flush before the task exits.
#[derive(Debug)]
pub struct AutoFlush {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl AutoFlush {
    /// Spawns the flush task on the current runtime.
    ///
    /// Returns `None` when the aggregator is disabled or its interval is zero.
    #[must_use]
    pub fn start(aggregator: Arc<AnalyticsAggregator>) -> Option<Self> {
        if !aggregator.config().auto_flush_enabled() {
            tracing::debug!("Auto-flush disabled");
            return None;
        }

        let period = aggregator.config().flush_interval;
        let batch_full = aggregator.flush_notifier();
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval = ?period, "Analytics auto-flush started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    () = batch_full.notified() => {},
                    () = stop.notified() => {
                        flush_off_runtime(&aggregator).await;
                        tracing::info!("Analytics auto-flush stopped");
                        break;
                    },
                }
                flush_off_runtime(&aggregator).await;
            }
        });

        Some(Self { shutdown, handle })
    }

    /// Stops the task after a final flush.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Analytics auto-flush task failed");
        }
    }
}

async fn flush_off_runtime(aggregator: &Arc<AnalyticsAggregator>) {
    let aggregator = Arc::clone(aggregator);
    match tokio::task::spawn_blocking(move || aggregator.flush()).await {
        Ok(FlushOutcome::Skipped) => {},
        Ok(outcome) => tracing::debug!(outcome = outcome.as_str(), "Auto-flush ran"),
        Err(e) => tracing::warn!(error = %e, "Analytics flush task failed"),
    }
}
