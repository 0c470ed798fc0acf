//! Service admin API integration tests.
//!
//! Tests spec apply, listing, deletion and route intent endpoints,
//! including the route materialization they trigger against the driver.

use std::sync::Arc;
use std::time::Duration;

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

/// Test harness for admin API tests.
struct ApiTestHarness {
    base_url: String,
    client: reqwest::Client,
    driver: Arc<MemoryDriver>,
    shutdown_tx: watch::Sender<bool>,
}

impl ApiTestHarness {
    async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,strato_runner=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let driver = Arc::new(MemoryDriver::new());
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

    fn version_url(&self, project: &str, service: &str, version: &str) -> String {
        format!(
            "{}/v1/projects/{project}/services/{service}/versions/{version}",
            self.base_url
        )
    }

    fn routes_url(&self, project: &str, service: &str) -> String {
        format!(
            "{}/v1/projects/{project}/services/{service}/routes",
            self.base_url
        )
    }

    /// Apply a single-port HTTP spec and return the response body.
    async fn apply(&self, version: &str, min_replicas: i32) -> serde_json::Value {
        let resp = self
            .client
            .put(self.version_url("acme", "checkout", version))
            .json(&serde_json::json!({
                "scale": { "min_replicas": min_replicas, "concurrency": 10 },
                "ports": [{ "name": "http", "protocol": "http", "port": 8080 }]
            }))
            .send()
            .await
            .unwrap();

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(status.is_success(), "Apply should succeed: {status} - {body:?}");
        body
    }
}

impl Drop for ApiTestHarness {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[tokio::test]
async fn test_apply_materializes_default_routes_through_the_gate() {
    let harness = ApiTestHarness::new().await;

    let body = harness.apply("v1", 0).await;

    assert_eq!(body["service"]["project"], "acme");
    assert_eq!(body["service"]["scale"]["min_replicas"], 0);

    let revision = body["revision"].as_str().expect("missing revision");
    assert!(
        revision.starts_with("sha256:"),
        "revision should be a content hash: {revision}"
    );

    let routes = body["routes"].as_array().expect("missing routes");
    assert_eq!(routes.len(), 1, "one declared port, one default route");
    let route = &routes[0];
    assert_eq!(route["name"], "http-8080");
    assert_eq!(route["retries"], 3);
    assert_eq!(route["timeout_secs"], 180);

    // Scale-to-zero HTTP goes through the activation edge, with the true
    // address carried as forward metadata.
    let dest = &route["destinations"][0];
    assert_eq!(dest["host"], "strato-edge.strato");
    assert_eq!(dest["port"], 4055);
    assert_eq!(dest["weight"], 100);
    assert_eq!(dest["forward"]["host"], "checkout-v1.acme.svc.cluster.local");
    assert_eq!(dest["forward"]["port"], 8080);
    assert_eq!(dest["forward"]["version"], "v1");

    // The driver saw the same set.
    let pushed = harness
        .driver
        .applied_routes("acme", "checkout")
        .await
        .expect("driver never saw routes");
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].name, "http-8080");
}

#[tokio::test]
async fn test_apply_with_floor_goes_direct() {
    let harness = ApiTestHarness::new().await;

    let body = harness.apply("v1", 1).await;

    let dest = &body["routes"][0]["destinations"][0];
    assert_eq!(dest["host"], "checkout-v1.acme.svc.cluster.local");
    assert_eq!(dest["port"], 8080);
    assert!(dest["forward"].is_null(), "warm destinations carry no forward");
}

#[tokio::test]
async fn test_floor_transition_repatches_routes() {
    let harness = ApiTestHarness::new().await;

    harness.apply("v1", 0).await;
    assert_eq!(harness.driver.route_pushes(), 1);

    // Raising the floor flips the destination from the gate to direct.
    let body = harness.apply("v1", 1).await;
    assert_eq!(harness.driver.route_pushes(), 2);
    let dest = &body["routes"][0]["destinations"][0];
    assert_eq!(dest["host"], "checkout-v1.acme.svc.cluster.local");
    assert!(dest["forward"].is_null());
}

#[tokio::test]
async fn test_reapply_of_unchanged_spec_skips_the_route_push() {
    let harness = ApiTestHarness::new().await;

    let first = harness.apply("v1", 0).await;
    let second = harness.apply("v1", 0).await;

    assert_eq!(first["revision"], second["revision"]);
    assert_eq!(
        harness.driver.route_pushes(),
        1,
        "an unchanged set should not be re-pushed"
    );
}

#[tokio::test]
async fn test_apply_rejects_zero_port_with_problem_details() {
    let harness = ApiTestHarness::new().await;

    let resp = harness
        .client
        .put(harness.version_url("acme", "checkout", "v1"))
        .header("x-request-id", "req-itest-1")
        .json(&serde_json::json!({
            "ports": [{ "name": "http", "protocol": "http", "port": 0 }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_port");
    assert_eq!(body["status"], 400);
    assert_eq!(body["type"], "https://strato.run/problems/invalid_port");
    assert_eq!(body["request_id"], "req-itest-1");
    assert_eq!(body["instance"], "req-itest-1");

    // Nothing was declared or pushed.
    assert_eq!(harness.driver.route_pushes(), 0);
}

#[tokio::test]
async fn test_get_and_list_services() {
    let harness = ApiTestHarness::new().await;

    harness.apply("v1", 0).await;
    harness.apply("v2", 1).await;

    let resp = harness
        .client
        .get(harness.version_url("acme", "checkout", "v2"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let spec: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(spec["version"], "v2");
    assert_eq!(spec["scale"]["min_replicas"], 1);

    let resp = harness
        .client
        .get(format!("{}/v1/projects/acme/services", harness.base_url))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let list: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(list["total"], 2);
    let items = list["items"].as_array().unwrap();
    assert_eq!(items[0]["version"], "v1");
    assert_eq!(items[1]["version"], "v2");

    // Filtering to an undeclared version is a 404.
    let resp = harness
        .client
        .get(format!(
            "{}/v1/projects/acme/services?service=checkout&version=v9",
            harness.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "unknown_service");
}

#[tokio::test]
async fn test_delete_prunes_version_and_clears_last_routes() {
    let harness = ApiTestHarness::new().await;

    harness.apply("v1", 0).await;

    let resp = harness
        .client
        .delete(harness.version_url("acme", "checkout", "v1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = harness
        .client
        .get(harness.version_url("acme", "checkout", "v1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // The last version going away clears the pushed set.
    let pushed = harness
        .driver
        .applied_routes("acme", "checkout")
        .await
        .expect("driver should have seen the clearing push");
    assert!(pushed.is_empty());

    let resp = harness
        .client
        .get(harness.routes_url("acme", "checkout"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["routes"].as_array().unwrap().len(), 0);
    assert!(body["revision"].is_null());
}

#[tokio::test]
async fn test_delete_of_undeclared_version_is_not_found() {
    let harness = ApiTestHarness::new().await;

    let resp = harness
        .client
        .delete(harness.version_url("acme", "checkout", "v9"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "unknown_service");
}

#[tokio::test]
async fn test_declared_routes_split_traffic_across_versions() {
    let harness = ApiTestHarness::new().await;

    harness.apply("v1", 1).await;
    harness.apply("v2", 0).await;

    let resp = harness
        .client
        .put(harness.routes_url("acme", "checkout"))
        .json(&serde_json::json!({
            "routes": [{
                "id": "split",
                "source": { "protocol": "http", "port": 8080 },
                "targets": [
                    { "type": "version", "version": "v1", "port": 8080, "weight": 90 },
                    { "type": "version", "version": "v2", "port": 8080, "weight": 10 }
                ],
                "request_retries": 5
            }]
        }))
        .send()
        .await
        .unwrap();

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(status.is_success(), "Set routes failed: {status} - {body:?}");

    assert_eq!(body["declared"].as_array().unwrap().len(), 1);
    let route = &body["routes"][0];
    assert_eq!(route["retries"], 5);

    let dests = route["destinations"].as_array().unwrap();
    assert_eq!(dests.len(), 2);
    // v1 has a floor and stays direct; v2 scales to zero and is indirected.
    assert_eq!(dests[0]["host"], "checkout-v1.acme.svc.cluster.local");
    assert!(dests[0]["forward"].is_null());
    assert_eq!(dests[1]["host"], "strato-edge.strato");
    assert_eq!(dests[1]["forward"]["version"], "v2");

    // GET reflects both the declared intent and the pushed set.
    let resp = harness
        .client
        .get(harness.routes_url("acme", "checkout"))
        .send()
        .await
        .unwrap();
    let fetched: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(fetched["declared"], body["declared"]);
    assert_eq!(fetched["revision"], body["revision"]);
}

#[tokio::test]
async fn test_invalid_route_leaves_declared_intent_untouched() {
    let harness = ApiTestHarness::new().await;

    harness.apply("v1", 0).await;
    let pushes_before = harness.driver.route_pushes();

    let resp = harness
        .client
        .put(harness.routes_url("acme", "checkout"))
        .json(&serde_json::json!({
            "routes": [{
                "id": "bad",
                "source": { "protocol": "http", "port": 8080 },
                "targets": [
                    { "type": "version", "version": "v9", "port": 8080, "weight": 100 }
                ]
            }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let problem: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(problem["code"], "invalid_route");
    assert!(
        problem["detail"].as_str().unwrap().contains("v9"),
        "detail should name the unknown version: {problem:?}"
    );

    // Neither the declared intent nor the pushed set moved.
    assert_eq!(harness.driver.route_pushes(), pushes_before);
    let resp = harness
        .client
        .get(harness.routes_url("acme", "checkout"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["declared"].is_null(), "rejected intent must not persist");
    assert_eq!(body["routes"][0]["name"], "http-8080");
}
