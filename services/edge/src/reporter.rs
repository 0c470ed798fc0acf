//! Ships activity samples to the runner.
//!
//! A single task drains the edge's bounded sample queue on a short interval
//! and POSTs each batch to the runner's ingest endpoint as NDJSON lines.
//! Samples are advisory: a failed delivery is logged and the batch dropped,
//! the next interval carries fresh counts anyway.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, trace, warn};

use strato_model::ActivitySample;

const SHIP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Reporter {
    client: reqwest::Client,
    ingest_url: String,
    token: Option<String>,
    interval: Duration,
}

impl Reporter {
    pub fn new(
        runner_url: &str,
        token: Option<String>,
        interval: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("strato-edge/0.1.0")
            .timeout(SHIP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            ingest_url: format!("{}/v1/metrics", runner_url.trim_end_matches('/')),
            token,
            interval,
        })
    }

    /// Drain and ship until the shutdown signal flips, then flush once more.
    pub async fn run(
        &self,
        mut samples: mpsc::Receiver<ActivitySample>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ship(drain(&mut samples)).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.ship(drain(&mut samples)).await;
                        info!("Reporter stopped");
                        break;
                    }
                }
            }
        }
    }

    async fn ship(&self, batch: Vec<ActivitySample>) {
        if batch.is_empty() {
            return;
        }

        let mut lines = Vec::with_capacity(batch.len());
        for sample in &batch {
            match serde_json::to_string(sample) {
                Ok(line) => lines.push(line),
                Err(error) => warn!(error = %error, "Skipping unserializable sample"),
            }
        }

        let mut request = self.client.post(&self.ingest_url).body(lines.join("\n"));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                trace!(samples = batch.len(), "Shipped sample batch");
            }
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    samples = batch.len(),
                    "Runner rejected sample batch"
                );
            }
            Err(error) => {
                warn!(error = %error, samples = batch.len(), "Failed to ship sample batch");
            }
        }
    }
}

fn drain(samples: &mut mpsc::Receiver<ActivitySample>) -> Vec<ActivitySample> {
    let mut batch = Vec::new();
    while let Ok(sample) = samples.try_recv() {
        batch.push(sample);
    }
    batch
}
