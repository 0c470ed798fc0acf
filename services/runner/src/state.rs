//! Shared application state.

use std::sync::Arc;

use strato_driver::{Driver, DriverError};
use strato_gate::SingleFlight;

use crate::auth::ClaimsVerifier;
use crate::bridge::ScalerBridge;
use crate::config::Config;
use crate::metrics::{IngestQueue, SampleStore};
use crate::registry::Registry;
use crate::routing::{ReconcileContext, RouteTable};

/// Outcome type for coalesced readiness waits.
pub type WaitOutcome = Result<(), Arc<DriverError>>;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    driver: Arc<dyn Driver>,
    store: Arc<dyn SampleStore>,
    verifier: Arc<dyn ClaimsVerifier>,
    ingest: IngestQueue,
    registry: Registry,
    table: RouteTable,
    bridge: ScalerBridge,
    wait_gate: SingleFlight<WaitOutcome>,
}

impl AppState {
    pub fn new(
        config: Config,
        driver: Arc<dyn Driver>,
        store: Arc<dyn SampleStore>,
        verifier: Arc<dyn ClaimsVerifier>,
        ingest: IngestQueue,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                driver,
                store,
                verifier,
                ingest,
                registry: Registry::new(),
                table: RouteTable::new(),
                bridge: ScalerBridge::new(),
                wait_gate: SingleFlight::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.inner.store
    }

    pub fn verifier(&self) -> &dyn ClaimsVerifier {
        self.inner.verifier.as_ref()
    }

    pub fn ingest(&self) -> &IngestQueue {
        &self.inner.ingest
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn table(&self) -> &RouteTable {
        &self.inner.table
    }

    pub fn bridge(&self) -> &ScalerBridge {
        &self.inner.bridge
    }

    pub fn wait_gate(&self) -> &SingleFlight<WaitOutcome> {
        &self.inner.wait_gate
    }

    /// Addressing context for route reconciliation.
    pub fn reconcile_ctx(&self) -> ReconcileContext<'_> {
        let config = self.config();
        ReconcileContext {
            gate_host: &config.gate_host,
            gate_port: config.gate_port,
            cluster_domain: &config.cluster_domain,
        }
    }
}
