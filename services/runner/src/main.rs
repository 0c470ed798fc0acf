//! strato runner
//!
//! The runner is the central coordination service for scale-to-zero
//! workloads. It ingests activity samples, drives periodic scale passes
//! against the substrate driver, and keeps routing state pointed at the
//! activation edge for floored-to-zero versions.

use std::sync::Arc;

use anyhow::Result;
use strato_driver::{Driver, HttpDriver, MemoryDriver};
use strato_runner::{
    api,
    auth::{AllowAll, ClaimsVerifier, SharedSecret},
    autoscale::AutoscaleWorker,
    config,
    metrics::{spawn_workers, MemorySampleStore, SampleStore},
    state::AppState,
};
use tokio::sync::watch;
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

    info!("Starting strato runner");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    // Select the substrate driver
    let driver: Arc<dyn Driver> = match &config.driver_url {
        Some(url) => {
            let driver = match HttpDriver::new(url, config.driver_token.as_deref(), config.wait_timeout)
            {
                Ok(driver) => driver,
                Err(e) => {
                    error!(error = %e, "Failed to build driver client");
                    return Err(e.into());
                }
            };
            info!(driver_url = %url, "Using HTTP driver");
            Arc::new(driver)
        }
        None => {
            warn!("STRATO_DRIVER_URL not set, using in-memory driver (development only)");
            Arc::new(MemoryDriver::new())
        }
    };

    let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new(config.sample_ttl));

    let verifier: Arc<dyn ClaimsVerifier> = match &config.metrics_token {
        Some(token) => Arc::new(SharedSecret::new(token)),
        None => {
            warn!("STRATO_METRICS_TOKEN not set, sample ingest is open (development only)");
            Arc::new(AllowAll)
        }
    };

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start ingest workers draining the sample queue
    let (ingest, ingest_handles) = spawn_workers(
        Arc::clone(&store),
        config.ingest_workers,
        config.ingest_buffer,
        shutdown_rx.clone(),
    );

    // Start the autoscale worker in background
    let autoscale_worker = AutoscaleWorker::new(
        Arc::clone(&store),
        Arc::clone(&driver),
        config.loop_interval,
        config.adjust_timeout,
    );
    let autoscale_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            autoscale_worker.run(shutdown_rx).await;
        }
    });

    // Create application state
    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config, driver, store, verifier, ingest);

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "Listening for connections");

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

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    // Wait for workers to finish
    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, autoscale_handle).await {
        warn!(error = %e, "Autoscale worker did not shut down in time");
    }

    for handle in ingest_handles {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Ingest worker did not shut down in time");
        }
    }

    info!("Runner shutdown complete");
    Ok(())
}
