//! # strato-driver
//!
//! The driver is the seam between the control plane and whatever substrate
//! actually runs workloads. The control plane decides *what* should happen
//! (replica counts, route sets, activations); the driver makes it so and
//! owns the substrate-specific math, such as converting an activity value
//! into a replica count via per-replica concurrency.
//!
//! Two implementations ship here: [`HttpDriver`] speaks the driver wire
//! surface to a remote agent, and [`MemoryDriver`] backs development mode
//! and tests.

mod http;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use strato_model::{ReconciledRoute, ScaleConfig, ServiceSpec, Target};

pub use http::HttpDriver;
pub use memory::{MemoryDriver, ScaleAdjustment};

/// Driver failures.
///
/// `Timeout` and `Unavailable` are transient: callers log them and let the
/// next natural cycle retry. The rest indicate a request that should not be
/// replayed as-is.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("driver responded {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid driver configuration: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Body of an adjust-scale call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustScaleRequest {
    pub value: i64,
}

/// Body of an apply-routes call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRoutesRequest {
    pub routes: Vec<ReconciledRoute>,
}

/// Contract every substrate driver fulfills.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Create or update the compute for a service version.
    async fn apply_service(&self, spec: &ServiceSpec) -> Result<(), DriverError>;

    /// Tear down the compute for a service version.
    async fn delete_service(&self, target: &Target) -> Result<(), DriverError>;

    /// Scale configs for every version of a service, keyed by version.
    async fn scale_configs(
        &self,
        project: &str,
        service: &str,
    ) -> Result<BTreeMap<String, ScaleConfig>, DriverError>;

    /// Drive the replica count of a version from an observed activity value.
    ///
    /// The driver owns the conversion to replicas (concurrency division,
    /// min/max clamping) and must tolerate being called while a previous
    /// adjustment is still in progress.
    async fn adjust_scale(&self, target: &Target, value: i64) -> Result<(), DriverError>;

    /// Block until the version has at least one ready replica.
    async fn wait_for_service(&self, target: &Target) -> Result<(), DriverError>;

    /// Signal intent to activate a scaled-to-zero version.
    async fn scale_up(&self, target: &Target) -> Result<(), DriverError>;

    /// Replace the full route set for a service.
    async fn apply_routes(
        &self,
        project: &str,
        service: &str,
        routes: &[ReconciledRoute],
    ) -> Result<(), DriverError>;
}
