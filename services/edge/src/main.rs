//! strato edge
//!
//! The edge is the activation proxy for scale-to-zero workloads. Requests
//! for floored-to-zero versions are indirected here by the mesh; the edge
//! recovers the true destination, wakes the workload through the driver,
//! coalesces readiness waits, forwards the request once the workload is up,
//! and reports in-flight activity back to the runner.

use std::sync::Arc;

use anyhow::Result;
use strato_driver::{Driver, HttpDriver};
use strato_edge::{config, intercept, reporter::Reporter, state::EdgeState};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to STRATO_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting strato edge");
    info!(
        listen_addr = %config.listen_addr,
        runner_url = %config.runner_url,
        node_id = %config.node_id,
        "Configuration loaded"
    );

    let driver: Arc<dyn Driver> = {
        let driver = match HttpDriver::new(
            &config.driver_url,
            config.driver_token.as_deref(),
            config.wait_timeout,
        ) {
            Ok(driver) => driver,
            Err(e) => {
                error!(error = %e, "Failed to build driver client");
                return Err(e.into());
            }
        };
        info!(driver_url = %config.driver_url, "Using HTTP driver");
        Arc::new(driver)
    };

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the sample reporter in background
    let (sample_tx, sample_rx) = mpsc::channel(config.sample_buffer);
    let reporter = Reporter::new(
        &config.runner_url,
        config.metrics_token.clone(),
        config.report_interval,
    )?;
    let reporter_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            reporter.run(sample_rx, shutdown_rx).await;
        }
    });

    // Build and run the server
    let state = EdgeState::new(config.node_id.clone(), driver, sample_tx)?;
    let app = intercept::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown and flush the reporter
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, reporter_handle).await {
        warn!(error = %e, "Reporter did not shut down in time");
    }

    info!("Edge shutdown complete");
    Ok(())
}
