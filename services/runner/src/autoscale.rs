//! Periodic scale pass: replay samples, window them, adjust the driver.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::instrument;

use strato_driver::Driver;

use crate::metrics::{to_adjust_value, ScaleDecision, SampleStore, StoreError, WindowSet};

/// Drives scale adjustments from stored activity samples.
///
/// Each pass is independent: it rebuilds both windows from a full replay,
/// so a crashed or restarted runner picks up where the samples left off.
/// Adjustments run detached from the pass under their own deadline; a slow
/// driver must not stall the next pass.
pub struct AutoscaleWorker {
    store: Arc<dyn SampleStore>,
    driver: Arc<dyn Driver>,
    interval: Duration,
    adjust_timeout: Duration,
}

struct PassStats {
    samples: usize,
    decisions: usize,
}

impl AutoscaleWorker {
    pub fn new(
        store: Arc<dyn SampleStore>,
        driver: Arc<dyn Driver>,
        interval: Duration,
        adjust_timeout: Duration,
    ) -> Self {
        Self {
            store,
            driver,
            interval,
            adjust_timeout,
        }
    }

    /// Run until the shutdown signal flips.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Autoscale worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_pass().await {
                        Ok(stats) if stats.decisions > 0 => {
                            tracing::debug!(
                                samples = stats.samples,
                                decisions = stats.decisions,
                                "Scale pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::error!(error = %error, "Scale pass aborted");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Autoscale worker stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn run_pass(&self) -> Result<PassStats, StoreError> {
        let records = self.store.replay().await?;
        let windows = WindowSet::build(&records, Utc::now().timestamp());
        let decisions = windows.into_decisions();

        let stats = PassStats {
            samples: records.len(),
            decisions: decisions.len(),
        };
        for decision in decisions {
            self.spawn_adjust(decision);
        }
        Ok(stats)
    }

    fn spawn_adjust(&self, decision: ScaleDecision) {
        let driver = Arc::clone(&self.driver);
        let deadline = self.adjust_timeout;
        tokio::spawn(async move {
            let value = to_adjust_value(decision.value);
            let adjust = driver.adjust_scale(&decision.target, value);
            match tokio::time::timeout(deadline, adjust).await {
                Ok(Ok(())) => {
                    tracing::trace!(target = %decision.target, value, "Scale adjusted");
                }
                Ok(Err(error)) => {
                    tracing::error!(target = %decision.target, value, error = %error, "Scale adjustment failed");
                }
                Err(_) => {
                    tracing::error!(
                        target = %decision.target,
                        value,
                        timeout_secs = deadline.as_secs(),
                        "Scale adjustment timed out"
                    );
                }
            }
        });
    }
}
