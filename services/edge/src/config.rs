//! Edge configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use ulid::Ulid;

/// Edge service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub listen_addr: String,

    /// Base URL of the runner, used for sample reporting.
    pub runner_url: String,

    /// Base URL of the driver surface. Defaults to the runner, whose
    /// passthrough API serves the driver contract.
    pub driver_url: String,

    /// Bearer token for the driver surface.
    pub driver_token: Option<String>,

    /// Identity attached to emitted activity samples.
    pub node_id: String,

    /// Capacity of the bounded sample queue.
    pub sample_buffer: usize,

    /// How often the reporter drains and ships samples.
    pub report_interval: Duration,

    /// Upper bound on one readiness wait.
    pub wait_timeout: Duration,

    /// Bearer token for the runner's ingest endpoint.
    pub metrics_token: Option<String>,

    /// Log level (used as fallback when RUST_LOG is not set).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr =
            std::env::var("STRATO_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:4055".to_string());

        let runner_url = std::env::var("STRATO_RUNNER_URL")
            .context("Missing runner URL. Set STRATO_RUNNER_URL.")?
            .trim_end_matches('/')
            .to_string();

        let driver_url = std::env::var("STRATO_DRIVER_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| runner_url.clone());

        let driver_token = std::env::var("STRATO_DRIVER_TOKEN").ok().filter(|v| !v.is_empty());

        let node_id = std::env::var("STRATO_NODE_ID")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("edge-{}", Ulid::new()));

        let sample_buffer = std::env::var("STRATO_SAMPLE_BUFFER")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("STRATO_SAMPLE_BUFFER must be an integer.")?
            .unwrap_or(1_024)
            .clamp(64, 65_536);

        let report_interval_ms = std::env::var("STRATO_REPORT_INTERVAL_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_REPORT_INTERVAL_MS must be an integer.")?
            .unwrap_or(200)
            .clamp(50, 5_000);

        let wait_timeout_secs = std::env::var("STRATO_WAIT_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("STRATO_WAIT_TIMEOUT_SECS must be an integer.")?
            .unwrap_or(300)
            .clamp(5, 900);

        let metrics_token = std::env::var("STRATO_METRICS_TOKEN").ok().filter(|v| !v.is_empty());

        let log_level = std::env::var("STRATO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            runner_url,
            driver_url,
            driver_token,
            node_id,
            sample_buffer,
            report_interval: Duration::from_millis(report_interval_ms),
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            metrics_token,
            log_level,
        })
    }
}
