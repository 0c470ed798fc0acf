//! Runner configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};

/// Runner service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub listen_addr: String,

    /// Base URL of the substrate driver agent. Unset means the in-memory
    /// driver, which materializes nothing and only suits development.
    pub driver_url: Option<String>,

    /// Bearer token for the driver agent.
    pub driver_token: Option<String>,

    /// Host of the activation edge, used as the destination for
    /// scale-to-zero route entries.
    pub gate_host: String,

    /// Port of the activation edge.
    pub gate_port: u16,

    /// Cluster-internal DNS suffix for direct service addresses.
    pub cluster_domain: String,

    /// Autoscale pass interval.
    pub loop_interval: Duration,

    /// Upper bound on a single detached adjust-scale call.
    pub adjust_timeout: Duration,

    /// How long ingested samples stay relevant.
    pub sample_ttl: Duration,

    /// Upper bound on a driver wait served through the passthrough API.
    pub wait_timeout: Duration,

    /// Number of ingest workers draining the sample queue.
    pub ingest_workers: usize,

    /// Capacity of the bounded sample queue.
    pub ingest_buffer: usize,

    /// Shared secret for the metrics ingest endpoint. Unset means ingest is
    /// open, which only suits development.
    pub metrics_token: Option<String>,

    /// Log level (used as fallback when RUST_LOG is not set).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr =
            std::env::var("STRATO_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:4050".to_string());

        let driver_url = std::env::var("STRATO_DRIVER_URL").ok().filter(|v| !v.is_empty());
        let driver_token = std::env::var("STRATO_DRIVER_TOKEN").ok().filter(|v| !v.is_empty());

        let gate_host =
            std::env::var("STRATO_GATE_HOST").unwrap_or_else(|_| "strato-edge.strato".to_string());

        let gate_port = std::env::var("STRATO_GATE_PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("STRATO_GATE_PORT must be a port number.")?
            .unwrap_or(4055);

        let cluster_domain =
            std::env::var("STRATO_CLUSTER_DOMAIN").unwrap_or_else(|_| "cluster.local".to_string());

        let loop_interval_ms = std::env::var("STRATO_LOOP_INTERVAL_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_LOOP_INTERVAL_MS must be an integer.")?
            .unwrap_or(5_000)
            .clamp(500, 60_000);

        let adjust_timeout_secs = std::env::var("STRATO_ADJUST_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_ADJUST_TIMEOUT_SECS must be an integer.")?
            .unwrap_or(300)
            .clamp(5, 900);

        let sample_ttl_secs = std::env::var("STRATO_SAMPLE_TTL_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_SAMPLE_TTL_SECS must be an integer.")?
            .unwrap_or(60)
            .clamp(10, 600);

        let wait_timeout_secs = std::env::var("STRATO_WAIT_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_WAIT_TIMEOUT_SECS must be an integer.")?
            .unwrap_or(300)
            .clamp(5, 900);

        let ingest_workers = std::env::var("STRATO_INGEST_WORKERS")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("STRATO_INGEST_WORKERS must be an integer.")?
            .unwrap_or(2)
            .clamp(1, 16);

        let ingest_buffer = std::env::var("STRATO_INGEST_BUFFER")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("STRATO_INGEST_BUFFER must be an integer.")?
            .unwrap_or(1_024)
            .clamp(64, 65_536);

        let metrics_token = std::env::var("STRATO_METRICS_TOKEN").ok().filter(|v| !v.is_empty());

        let log_level = std::env::var("STRATO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            driver_url,
            driver_token,
            gate_host,
            gate_port,
            cluster_domain,
            loop_interval: Duration::from_millis(loop_interval_ms),
            adjust_timeout: Duration::from_secs(adjust_timeout_secs),
            sample_ttl: Duration::from_secs(sample_ttl_secs),
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            ingest_workers,
            ingest_buffer,
            metrics_token,
            log_level,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4050".to_string(),
            driver_url: None,
            driver_token: None,
            gate_host: "strato-edge.strato".to_string(),
            gate_port: 4055,
            cluster_domain: "cluster.local".to_string(),
            loop_interval: Duration::from_secs(5),
            adjust_timeout: Duration::from_secs(300),
            sample_ttl: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(300),
            ingest_workers: 2,
            ingest_buffer: 1_024,
            metrics_token: None,
            log_level: "info".to_string(),
        }
    }
}
