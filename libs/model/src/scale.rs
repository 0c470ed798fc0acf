//! Service deployment model: scale policy, ports, declared specs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Target;

/// Default maximum replica count when a spec leaves it unset.
pub const DEFAULT_MAX_REPLICAS: i32 = 100;

/// Default per-replica concurrency when a spec leaves it unset.
pub const DEFAULT_CONCURRENCY: i32 = 50;

/// How aggregated activity is interpreted when driving replica counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleMode {
    /// Aggregate is a request rate; scale to sustain it.
    RequestsPerSecond,

    /// Aggregate is a count of in-flight requests; scale by concurrency.
    ActiveRequests,
}

impl Default for ScaleMode {
    fn default() -> Self {
        Self::RequestsPerSecond
    }
}

impl ScaleMode {
    /// Wire name, as used for metric names in the scaler contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestsPerSecond => "requests-per-second",
            Self::ActiveRequests => "active-requests",
        }
    }
}

impl std::fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a scaling mode from its wire name.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown scaling mode ({0})")]
pub struct ParseScaleModeError(String);

impl std::str::FromStr for ScaleMode {
    type Err = ParseScaleModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests-per-second" => Ok(Self::RequestsPerSecond),
            "active-requests" => Ok(Self::ActiveRequests),
            other => Err(ParseScaleModeError(other.to_string())),
        }
    }
}

/// Replica and concurrency policy for one service version.
///
/// `min_replicas == 0` marks the version as scale-to-zero: cold traffic is
/// indirected through the activation edge instead of hitting it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub min_replicas: i32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,

    #[serde(default = "default_concurrency")]
    pub concurrency: i32,

    #[serde(default)]
    pub mode: ScaleMode,
}

fn default_replicas() -> i32 {
    1
}

fn default_max_replicas() -> i32 {
    DEFAULT_MAX_REPLICAS
}

fn default_concurrency() -> i32 {
    DEFAULT_CONCURRENCY
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            min_replicas: 0,
            max_replicas: default_max_replicas(),
            concurrency: default_concurrency(),
            mode: ScaleMode::default(),
        }
    }
}

impl ScaleConfig {
    /// Whether this version is eligible for scale-to-zero indirection.
    pub fn scales_to_zero(&self) -> bool {
        self.min_replicas == 0
    }
}

/// Wire protocol served on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port exposed by a service version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
}

/// Declared shape of one service version.
///
/// This is the admin-facing unit of deployment. Compute materialization is
/// the driver's job; the control plane keeps the spec for scale decisions
/// and route generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub project: String,
    pub service: String,
    pub version: String,

    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ServiceSpec {
    pub fn target(&self) -> Target {
        Target::new(&self.project, &self.service, &self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&ScaleMode::RequestsPerSecond).unwrap(),
            "\"requests-per-second\""
        );
        assert_eq!(
            serde_json::to_string(&ScaleMode::ActiveRequests).unwrap(),
            "\"active-requests\""
        );

        let parsed: ScaleMode = serde_json::from_str("\"active-requests\"").unwrap();
        assert_eq!(parsed, ScaleMode::ActiveRequests);

        assert_eq!(
            "requests-per-second".parse::<ScaleMode>(),
            Ok(ScaleMode::RequestsPerSecond)
        );
        assert!("parallel".parse::<ScaleMode>().is_err());
    }

    #[test]
    fn test_scale_config_defaults_fill_absent_fields() {
        let config: ScaleConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.replicas, 1);
        assert_eq!(config.min_replicas, 0);
        assert_eq!(config.max_replicas, DEFAULT_MAX_REPLICAS);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.mode, ScaleMode::RequestsPerSecond);
        assert!(config.scales_to_zero());
    }

    #[test]
    fn test_service_spec_round_trip() {
        let spec = ServiceSpec {
            project: "acme".into(),
            service: "checkout".into(),
            version: "v3".into(),
            scale: ScaleConfig {
                min_replicas: 2,
                mode: ScaleMode::ActiveRequests,
                ..ScaleConfig::default()
            },
            ports: vec![PortSpec {
                name: "http".into(),
                protocol: Protocol::Http,
                port: 8080,
            }],
            labels: BTreeMap::new(),
        };

        let json = serde_json::to_string(&spec).unwrap();
        let back: ServiceSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(back, spec);
        assert!(!back.scale.scales_to_zero());
        assert_eq!(back.target(), Target::new("acme", "checkout", "v3"));
    }
}
