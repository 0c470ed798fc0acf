//! Shared edge state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use strato_driver::{Driver, DriverError};
use strato_gate::SingleFlight;
use strato_model::ActivitySample;

use crate::forward::Forwarder;
use crate::inflight::InflightTable;

/// Result shared by every caller coalesced onto one readiness wait.
pub type ActivationOutcome = Result<(), Arc<DriverError>>;

#[derive(Clone)]
pub struct EdgeState {
    inner: Arc<EdgeStateInner>,
}

struct EdgeStateInner {
    node_id: String,
    driver: Arc<dyn Driver>,
    gate: SingleFlight<ActivationOutcome>,
    forwarder: Forwarder,
    inflight: InflightTable,
    samples: mpsc::Sender<ActivitySample>,
}

impl EdgeState {
    pub fn new(
        node_id: impl Into<String>,
        driver: Arc<dyn Driver>,
        samples: mpsc::Sender<ActivitySample>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            inner: Arc::new(EdgeStateInner {
                node_id: node_id.into(),
                driver,
                gate: SingleFlight::new(),
                forwarder: Forwarder::new()?,
                inflight: InflightTable::new(),
                samples,
            }),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    pub fn gate(&self) -> &SingleFlight<ActivationOutcome> {
        &self.inner.gate
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.inner.forwarder
    }

    pub fn inflight(&self) -> &InflightTable {
        &self.inner.inflight
    }

    /// Offer a sample to the reporter queue. Never blocks; a full queue
    /// drops the sample.
    pub fn offer_sample(&self, sample: ActivitySample) {
        if let Err(mpsc::error::TrySendError::Full(sample)) = self.inner.samples.try_send(sample) {
            trace!(
                project = %sample.project,
                service = %sample.service,
                version = %sample.version,
                "Sample queue full, dropping"
            );
        }
    }
}
