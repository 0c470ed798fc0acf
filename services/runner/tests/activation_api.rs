//! Driver passthrough integration tests.
//!
//! Remote edges reach the substrate through these endpoints, so the tests
//! focus on error mapping and on coalescing of concurrent readiness waits.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use strato_driver::MemoryDriver;
use strato_runner::{
    api,
    auth::{AllowAll, ClaimsVerifier},
    config::Config,
    metrics::{spawn_workers, MemorySampleStore, SampleStore},
    state::AppState,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Test harness for passthrough API tests.
struct PassthroughTestHarness {
    base_url: String,
    client: reqwest::Client,
    driver: Arc<MemoryDriver>,
    shutdown_tx: watch::Sender<bool>,
}

impl PassthroughTestHarness {
    async fn new() -> Self {
        Self::with_driver(MemoryDriver::new()).await
    }

    async fn with_driver(driver: MemoryDriver) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,strato_runner=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let driver = Arc::new(driver);
        let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new(Duration::from_secs(60)));
        let verifier: Arc<dyn ClaimsVerifier> = Arc::new(AllowAll);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ingest, _handles) = spawn_workers(Arc::clone(&store), 1, 64, shutdown_rx);

        let state = AppState::new(
            Config::default(),
            Arc::clone(&driver) as _,
            store,
            verifier,
            ingest,
        );
        let app = api::create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            driver,
            shutdown_tx,
        }
    }

    async fn apply_version(&self, version: &str, min_replicas: i32) {
        let resp = self
            .client
            .put(format!(
                "{}/v1/projects/acme/services/checkout/versions/{version}",
                self.base_url
            ))
            .json(&serde_json::json!({
                "scale": { "min_replicas": min_replicas, "concurrency": 10 }
            }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "Apply failed: {}", resp.status());
    }

    fn passthrough_url(&self, version: &str, suffix: &str) -> String {
        format!(
            "{}/v1/driver/projects/acme/services/checkout/versions/{version}{suffix}",
            self.base_url
        )
    }
}

impl Drop for PassthroughTestHarness {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[tokio::test]
async fn test_scale_configs_passthrough_reports_all_versions() {
    let harness = PassthroughTestHarness::new().await;
    harness.apply_version("v1", 1).await;
    harness.apply_version("v2", 0).await;

    let resp = harness
        .client
        .get(format!(
            "{}/v1/driver/projects/acme/services/checkout/scale",
            harness.base_url
        ))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let configs: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(configs["v1"]["min_replicas"], 1);
    assert_eq!(configs["v2"]["min_replicas"], 0);
    assert_eq!(configs["v2"]["concurrency"], 10);
}

#[tokio::test]
async fn test_adjust_scale_passthrough_reaches_the_driver() {
    let harness = PassthroughTestHarness::new().await;
    harness.apply_version("v1", 0).await;

    let resp = harness
        .client
        .post(harness.passthrough_url("v1", "/adjust"))
        .json(&serde_json::json!({ "value": 25 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let adjustments = harness.driver.adjustments().await;
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].value, 25);
}

#[tokio::test]
async fn test_scale_up_for_unknown_version_is_not_found() {
    let harness = PassthroughTestHarness::new().await;

    let resp = harness
        .client
        .post(harness.passthrough_url("v9", "/scale-up"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "unknown_service");
}

#[tokio::test]
async fn test_concurrent_waits_share_one_driver_call() {
    let harness =
        PassthroughTestHarness::with_driver(MemoryDriver::new().with_wait_delay(Duration::from_millis(150)))
            .await;
    harness.apply_version("v1", 0).await;

    let resp = harness
        .client
        .post(harness.passthrough_url("v1", "/scale-up"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let url = harness.passthrough_url("v1", "/wait");
    let waits = (0..8).map(|_| {
        let client = harness.client.clone();
        let url = url.clone();
        async move { client.post(url).send().await.unwrap().status() }
    });

    let statuses = join_all(waits).await;
    assert!(
        statuses.iter().all(|status| *status == 204),
        "every wait should resolve: {statuses:?}"
    );
    assert_eq!(
        harness.driver.wait_calls(),
        1,
        "concurrent waits must coalesce into one driver call"
    );
}

#[tokio::test]
async fn test_wait_failure_maps_to_unavailable() {
    let harness = PassthroughTestHarness::new().await;
    harness.apply_version("v1", 0).await;
    harness.driver.set_wait_failure(true);

    let resp = harness
        .client
        .post(harness.passthrough_url("v1", "/wait"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "driver_unavailable");
    assert_eq!(problem["retryable"], true);
    assert_eq!(problem["retry_after_seconds"], 1);
}

#[tokio::test]
async fn test_wait_for_unknown_version_is_not_found() {
    let harness = PassthroughTestHarness::new().await;

    let resp = harness
        .client
        .post(harness.passthrough_url("v9", "/wait"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "unknown_service");
}

#[tokio::test]
async fn test_health_endpoints() {
    let harness = PassthroughTestHarness::new().await;

    let resp = harness
        .client
        .get(format!("{}/healthz", harness.base_url))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "runner");
    assert!(!body["version"].as_str().unwrap().is_empty());

    let resp = harness
        .client
        .get(format!("{}/livez", harness.base_url))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let resp = harness
        .client
        .get(format!("{}/readyz", harness.base_url))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn test_readyz_degrades_once_ingest_stops() {
    let harness = PassthroughTestHarness::new().await;

    harness.shutdown_tx.send(true).unwrap();

    // The workers notice the signal on their next gather; poll until the
    // queue reads as closed.
    let url = format!("{}/readyz", harness.base_url);
    let mut status = reqwest::StatusCode::OK;
    for _ in 0..100 {
        status = harness.client.get(&url).send().await.unwrap().status();
        if status == 503 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, 503);

    let resp = harness.client.get(&url).send().await.unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["ingest"]["status"], "unavailable");
}
