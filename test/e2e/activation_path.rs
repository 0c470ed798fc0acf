//! End-to-end cold-start test.
//!
//! Wires the real services together in-process and validates the complete
//! activation path:
//!
//! 1. Declare a scale-to-zero version through the runner's deploy API
//! 2. Verify its route is materialized against the activation edge
//! 3. Send an indirected request to the edge and watch it wake the
//!    workload through the runner's driver passthrough
//! 4. Verify the forwarded response comes back verbatim
//! 5. Verify the edge's activity samples surface in the runner's windows
//!
//! ## Running
//!
//! ```bash
//! cargo test -p strato-e2e --test activation_path
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, http::StatusCode, response::IntoResponse, Router};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use strato_driver::{Driver, HttpDriver, MemoryDriver};
use strato_edge::{intercept, reporter::Reporter, state::EdgeState};
use strato_model::Target;
use strato_runner::{
    api,
    auth::{AllowAll, ClaimsVerifier},
    config::Config,
    metrics::{spawn_workers, MemorySampleStore, SampleStore},
    state::AppState,
};

async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

/// A workload that echoes its request body.
async fn workload_handler(req: Request) -> impl IntoResponse {
    let body = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .unwrap();
    (
        StatusCode::OK,
        [("x-workload", "checkout")],
        format!("echo:{}", String::from_utf8_lossy(&body)),
    )
}

/// E2E cold-start test covering the full activation path.
///
/// This test validates:
/// - Version declaration and route materialization against the edge
/// - Activation through the runner's driver passthrough
/// - Readiness waiting and verbatim forwarding
/// - Activity reporting from edge to runner
/// - The external scaler's view of the resulting activity
#[tokio::test]
async fn e2e_cold_start_request_wakes_the_workload() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,strato_runner=debug,strato_edge=debug".into()),
        )
        .with_test_writer()
        .try_init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ===========================================================================
    // Boot the runner on the in-memory substrate
    // ===========================================================================
    let driver = Arc::new(MemoryDriver::new());
    let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new(Duration::from_secs(60)));
    let verifier: Arc<dyn ClaimsVerifier> = Arc::new(AllowAll);
    let (ingest, _ingest_handles) = spawn_workers(Arc::clone(&store), 2, 256, shutdown_rx.clone());
    let state = AppState::new(
        Config::default(),
        Arc::clone(&driver) as Arc<dyn Driver>,
        store,
        verifier,
        ingest,
    );
    let (runner_addr, runner_handle) = serve(api::create_router(state)).await;
    let runner_url = format!("http://{runner_addr}");

    // ===========================================================================
    // Boot the workload and the edge
    // ===========================================================================
    let (workload_addr, workload_handle) = serve(Router::new().fallback(workload_handler)).await;

    let edge_driver: Arc<dyn Driver> =
        Arc::new(HttpDriver::new(&runner_url, None, Duration::from_secs(30)).unwrap());
    let (sample_tx, sample_rx) = mpsc::channel(256);
    let reporter = Reporter::new(&runner_url, None, Duration::from_millis(100)).unwrap();
    let reporter_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            reporter.run(sample_rx, shutdown_rx).await;
        }
    });
    let edge_state = EdgeState::new("edge-e2e", edge_driver, sample_tx).unwrap();
    let (edge_addr, edge_handle) = serve(intercept::create_router(edge_state)).await;
    let edge_url = format!("http://{edge_addr}");

    let client = reqwest::Client::new();

    // ===========================================================================
    // Step 1: Declare a scale-to-zero version
    // ===========================================================================
    let resp = client
        .put(format!(
            "{runner_url}/v1/projects/acme/services/checkout/versions/v1"
        ))
        .json(&serde_json::json!({
            "scale": { "min_replicas": 0, "max_replicas": 5, "concurrency": 10 },
            "ports": [{ "name": "http", "protocol": "http", "port": 8080 }]
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "apply failed");
    let applied: serde_json::Value = resp.json().await.unwrap();

    // ===========================================================================
    // Step 2: The materialized route points at the edge with forward metadata
    // ===========================================================================
    let destination = &applied["routes"][0]["destinations"][0];
    assert_eq!(destination["host"], "strato-edge.strato");
    let forward = destination["forward"].clone();
    assert_eq!(forward["project"], "acme");
    assert_eq!(forward["service"], "checkout");
    assert_eq!(forward["version"], "v1");

    let target = Target::new("acme", "checkout", "v1");
    assert_eq!(
        driver.ready_replicas(&target).await,
        Some(0),
        "version should start scaled to zero"
    );

    // ===========================================================================
    // Step 3: Send an indirected request (playing the mesh's role)
    // ===========================================================================
    let resp = client
        .post(format!("{edge_url}/orders?mode=cold"))
        .header("x-og-project", forward["project"].as_str().unwrap())
        .header("x-og-service", forward["service"].as_str().unwrap())
        .header("x-og-host", workload_addr.ip().to_string())
        .header("x-og-port", workload_addr.port().to_string())
        .header("x-og-version", forward["version"].as_str().unwrap())
        .body("first order")
        .send()
        .await
        .unwrap();

    // ===========================================================================
    // Step 4: The forwarded response comes back verbatim
    // ===========================================================================
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-workload").unwrap(), "checkout");
    assert_eq!(resp.text().await.unwrap(), "echo:first order");

    assert!(
        driver.wait_calls() >= 1,
        "activation should wait for readiness"
    );
    assert_eq!(
        driver.ready_replicas(&target).await,
        Some(1),
        "activation should bring up one replica"
    );

    // ===========================================================================
    // Step 5: Activity samples surface in the runner's metric windows
    // ===========================================================================
    let metrics_request = serde_json::json!({
        "scaledObjectRef": {
            "scalerMetadata": { "project": "acme", "service": "checkout", "version": "v1" }
        },
        "metricName": "active-requests"
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut metric_value = 0;
    loop {
        let resp = client
            .post(format!("{runner_url}/v1/scaler/metrics"))
            .json(&metrics_request)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "scaler metrics failed");
        let body: serde_json::Value = resp.json().await.unwrap();
        metric_value = body["metricValues"][0]["metricValue"].as_i64().unwrap();
        if metric_value >= 1 {
            break;
        }
        if std::time::Instant::now() > deadline {
            panic!("samples never surfaced; last metric value: {metric_value}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // The scaler sees the activity too.
    let resp = client
        .post(format!("{runner_url}/v1/scaler/is-active"))
        .json(&serde_json::json!({
            "scalerMetadata": {
                "project": "acme", "service": "checkout", "version": "v1", "minReplicas": "0"
            }
        }))
        .send()
        .await
        .unwrap();
    let active: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        active["result"], true,
        "recent activity should read as active"
    );

    // ===========================================================================
    // Step 6: A warm request forwards straight through
    // ===========================================================================
    let resp = client
        .get(format!("{edge_url}/orders"))
        .header("x-og-project", "acme")
        .header("x-og-service", "checkout")
        .header("x-og-host", workload_addr.ip().to_string())
        .header("x-og-port", workload_addr.port().to_string())
        .header("x-og-version", "v1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // ===========================================================================
    // Cleanup
    // ===========================================================================
    let _ = shutdown_tx.send(true);
    let _ = reporter_handle.await;
    runner_handle.abort();
    edge_handle.abort();
    workload_handle.abort();

    println!("E2E cold start test completed successfully!");
    println!("  Metric value observed: {metric_value}");
}
