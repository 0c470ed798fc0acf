//! Forwarded-destination metadata for the activation path.
//!
//! Scale-to-zero versions are reached through the activation edge. The mesh
//! rewrites their route destinations to the edge address and attaches these
//! headers so the edge can recover the true destination. The edge strips
//! them before forwarding; they never reach the workload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Target;

pub const HEADER_PROJECT: &str = "x-og-project";
pub const HEADER_SERVICE: &str = "x-og-service";
pub const HEADER_HOST: &str = "x-og-host";
pub const HEADER_PORT: &str = "x-og-port";
pub const HEADER_VERSION: &str = "x-og-version";

/// All forwarded-destination header names, in canonical order.
pub const FORWARD_HEADERS: [&str; 5] = [
    HEADER_PROJECT,
    HEADER_SERVICE,
    HEADER_HOST,
    HEADER_PORT,
    HEADER_VERSION,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("missing forwarded header {0}")]
    MissingHeader(&'static str),

    #[error("invalid forwarded port: {0}")]
    InvalidPort(String),
}

/// The true destination of an indirected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardInfo {
    pub project: String,
    pub service: String,
    pub host: String,
    pub port: u16,
    pub version: String,
}

impl ForwardInfo {
    pub fn target(&self) -> Target {
        Target::new(&self.project, &self.service, &self.version)
    }

    /// Header name/value pairs in canonical order.
    pub fn header_pairs(&self) -> [(&'static str, String); 5] {
        [
            (HEADER_PROJECT, self.project.clone()),
            (HEADER_SERVICE, self.service.clone()),
            (HEADER_HOST, self.host.clone()),
            (HEADER_PORT, self.port.to_string()),
            (HEADER_VERSION, self.version.clone()),
        ]
    }

    /// Recover the destination from a header lookup.
    ///
    /// All five headers must be present; a partial set means the request did
    /// not come through the mesh indirection.
    pub fn from_lookup<'a, F>(get: F) -> Result<Self, ForwardError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let require = |name: &'static str| {
            get(name)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .ok_or(ForwardError::MissingHeader(name))
        };

        let port_raw = require(HEADER_PORT)?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| ForwardError::InvalidPort(port_raw))?;

        Ok(Self {
            project: require(HEADER_PROJECT)?,
            service: require(HEADER_SERVICE)?,
            host: require(HEADER_HOST)?,
            port,
            version: require(HEADER_VERSION)?,
        })
    }
}
