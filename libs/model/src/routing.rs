//! Declared routing model and weighted target selection.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ForwardInfo, Protocol};

/// Default per-try retry count applied when a route leaves it unset.
pub const DEFAULT_REQUEST_RETRIES: u32 = 3;

/// Default request timeout in seconds applied when a route leaves it unset.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

/// Routing configuration errors.
///
/// These are rejected synchronously when a route set is applied; a bad route
/// never results in a partially applied set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("port cannot be zero")]
    ZeroPort,

    #[error("at least one target needs to be provided")]
    NoTargets,

    #[error("version ({version}) not found for service ({service})")]
    UnknownVersion { version: String, service: String },

    #[error("weight ({0}) is higher than the cumulative weight of all targets")]
    WeightExhausted(i32),
}

/// Where traffic enters a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSource {
    pub protocol: Protocol,
    pub port: u16,
}

/// Where a route sends traffic.
///
/// A closed set: deserializing an unrecognized `type` tag is an error, so an
/// unknown target kind can never reach selection or reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteTarget {
    /// A version of the service the route belongs to.
    Version { version: String, port: u16, weight: i32 },

    /// An address outside the service, routed directly and never indirected.
    External { host: String, port: u16, weight: i32 },
}

impl RouteTarget {
    pub fn weight(&self) -> i32 {
        match self {
            Self::Version { weight, .. } | Self::External { weight, .. } => *weight,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Version { port, .. } | Self::External { port, .. } => *port,
        }
    }
}

/// One declared route: a listen source and a weighted target list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,

    pub source: RouteSource,

    pub targets: Vec<RouteTarget>,

    /// Falls back to [`DEFAULT_REQUEST_RETRIES`] during reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_retries: Option<u32>,

    /// Falls back to [`DEFAULT_REQUEST_TIMEOUT_SECS`] during reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Route {
    /// Pick a target by cumulative weight.
    ///
    /// A negative `weight` asks for a uniform draw in `[0, 100)`. The walk
    /// returns the first target whose cumulative weight reaches the draw; a
    /// draw above the total is a configuration error, not a fallback.
    pub fn select_target(&self, weight: i32) -> Result<&RouteTarget, RouteError> {
        let draw = if weight < 0 {
            rand::rng().random_range(0..100)
        } else {
            weight
        };

        let mut cumulative = 0;
        for target in &self.targets {
            cumulative += target.weight();
            if cumulative >= draw {
                return Ok(target);
            }
        }

        Err(RouteError::WeightExhausted(draw))
    }
}

/// One destination entry of a reconciled route.
///
/// `forward` is present only when traffic to this destination is indirected
/// through the activation edge; it carries the true address the edge should
/// dial. Warm and external destinations carry no forward metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledDestination {
    pub host: String,
    pub port: u16,
    pub weight: i32,

    /// The service version this destination serves, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardInfo>,
}

/// A validated route with defaults applied, ready for the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledRoute {
    pub name: String,
    pub protocol: Protocol,
    pub source_port: u16,
    pub retries: u32,
    pub timeout_secs: u64,
    pub destinations: Vec<ReconciledDestination>,
}
