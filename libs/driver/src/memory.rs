//! In-memory driver for development mode and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use strato_model::{ReconciledRoute, ScaleConfig, ServiceSpec, Target};

use crate::{Driver, DriverError};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_POLL_LIMIT: u32 = 100;

/// One recorded adjust-scale call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleAdjustment {
    pub target: Target,
    pub value: i64,
}

struct VersionState {
    spec: ServiceSpec,
    ready_replicas: i32,
}

/// Driver that materializes nothing.
///
/// Tracks applied specs and routes, answers scale-config queries from them,
/// and models replica counts with the same ceil-by-concurrency clamp a real
/// substrate applies. Every mutating call is recorded for assertions.
pub struct MemoryDriver {
    services: RwLock<HashMap<String, BTreeMap<String, VersionState>>>,
    routes: RwLock<HashMap<String, Vec<ReconciledRoute>>>,
    adjustments: Mutex<Vec<ScaleAdjustment>>,
    wait_calls: AtomicUsize,
    route_pushes: AtomicUsize,
    fail_waits: AtomicBool,
    wait_delay: Duration,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            adjustments: Mutex::new(Vec::new()),
            wait_calls: AtomicUsize::new(0),
            route_pushes: AtomicUsize::new(0),
            fail_waits: AtomicBool::new(false),
            wait_delay: Duration::ZERO,
        }
    }

    /// Add artificial latency to every `wait_for_service` call.
    pub fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Force subsequent `wait_for_service` calls to fail.
    pub fn set_wait_failure(&self, fail: bool) {
        self.fail_waits.store(fail, Ordering::SeqCst);
    }

    /// Number of `wait_for_service` calls that actually ran.
    pub fn wait_calls(&self) -> usize {
        self.wait_calls.load(Ordering::SeqCst)
    }

    /// Number of `apply_routes` calls received.
    pub fn route_pushes(&self) -> usize {
        self.route_pushes.load(Ordering::SeqCst)
    }

    pub async fn adjustments(&self) -> Vec<ScaleAdjustment> {
        self.adjustments.lock().await.clone()
    }

    pub async fn applied_routes(&self, project: &str, service: &str) -> Option<Vec<ReconciledRoute>> {
        self.routes
            .read()
            .await
            .get(&service_key(project, service))
            .cloned()
    }

    pub async fn ready_replicas(&self, target: &Target) -> Option<i32> {
        self.services
            .read()
            .await
            .get(&target.service_key())
            .and_then(|versions| versions.get(&target.version))
            .map(|state| state.ready_replicas)
    }
}

fn service_key(project: &str, service: &str) -> String {
    format!("{project}/{service}")
}

fn replicas_for(value: i64, scale: &ScaleConfig) -> i32 {
    let concurrency = i64::from(scale.concurrency.max(1));
    let wanted = if value <= 0 {
        0
    } else {
        (value + concurrency - 1) / concurrency
    };
    wanted.clamp(i64::from(scale.min_replicas), i64::from(scale.max_replicas)) as i32
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn apply_service(&self, spec: &ServiceSpec) -> Result<(), DriverError> {
        let mut services = self.services.write().await;
        let versions = services
            .entry(service_key(&spec.project, &spec.service))
            .or_default();

        match versions.get_mut(&spec.version) {
            Some(state) => {
                state.ready_replicas = state.ready_replicas.max(spec.scale.min_replicas);
                state.spec = spec.clone();
            }
            None => {
                versions.insert(
                    spec.version.clone(),
                    VersionState {
                        ready_replicas: spec.scale.min_replicas,
                        spec: spec.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_service(&self, target: &Target) -> Result<(), DriverError> {
        let mut services = self.services.write().await;
        if let Some(versions) = services.get_mut(&target.service_key()) {
            versions.remove(&target.version);
            if versions.is_empty() {
                services.remove(&target.service_key());
            }
        }
        Ok(())
    }

    async fn scale_configs(
        &self,
        project: &str,
        service: &str,
    ) -> Result<BTreeMap<String, ScaleConfig>, DriverError> {
        let services = self.services.read().await;
        Ok(services
            .get(&service_key(project, service))
            .map(|versions| {
                versions
                    .iter()
                    .map(|(version, state)| (version.clone(), state.spec.scale.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn adjust_scale(&self, target: &Target, value: i64) -> Result<(), DriverError> {
        self.adjustments.lock().await.push(ScaleAdjustment {
            target: target.clone(),
            value,
        });

        let mut services = self.services.write().await;
        let state = services
            .get_mut(&target.service_key())
            .and_then(|versions| versions.get_mut(&target.version))
            .ok_or_else(|| DriverError::NotFound(target.to_string()))?;

        state.ready_replicas = replicas_for(value, &state.spec.scale);
        Ok(())
    }

    async fn wait_for_service(&self, target: &Target) -> Result<(), DriverError> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);

        if self.wait_delay > Duration::ZERO {
            tokio::time::sleep(self.wait_delay).await;
        }
        if self.fail_waits.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable(format!(
                "activation failed for {target}"
            )));
        }

        for _ in 0..WAIT_POLL_LIMIT {
            match self.ready_replicas(target).await {
                None => return Err(DriverError::NotFound(target.to_string())),
                Some(ready) if ready >= 1 => return Ok(()),
                Some(_) => tokio::time::sleep(WAIT_POLL_INTERVAL).await,
            }
        }
        Err(DriverError::Timeout(target.to_string()))
    }

    async fn scale_up(&self, target: &Target) -> Result<(), DriverError> {
        let mut services = self.services.write().await;
        let state = services
            .get_mut(&target.service_key())
            .and_then(|versions| versions.get_mut(&target.version))
            .ok_or_else(|| DriverError::NotFound(target.to_string()))?;

        state.ready_replicas = state.ready_replicas.max(1);
        Ok(())
    }

    async fn apply_routes(
        &self,
        project: &str,
        service: &str,
        routes: &[ReconciledRoute],
    ) -> Result<(), DriverError> {
        self.route_pushes.fetch_add(1, Ordering::SeqCst);
        self.routes
            .write()
            .await
            .insert(service_key(project, service), routes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strato_model::ScaleMode;

    use super::*;

    fn spec(version: &str, min: i32, max: i32, concurrency: i32) -> ServiceSpec {
        ServiceSpec {
            project: "acme".into(),
            service: "checkout".into(),
            version: version.into(),
            scale: ScaleConfig {
                replicas: 1,
                min_replicas: min,
                max_replicas: max,
                concurrency,
                mode: ScaleMode::ActiveRequests,
            },
            ports: Vec::new(),
            labels: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_apply_then_scale_configs() {
        let driver = MemoryDriver::new();
        driver.apply_service(&spec("v1", 1, 5, 50)).await.unwrap();
        driver.apply_service(&spec("v2", 0, 5, 50)).await.unwrap();

        let configs = driver.scale_configs("acme", "checkout").await.unwrap();
        assert_eq!(configs.len(), 2);
        assert!(!configs["v1"].scales_to_zero());
        assert!(configs["v2"].scales_to_zero());

        assert!(driver
            .scale_configs("acme", "missing")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_adjust_scale_applies_concurrency_clamp() {
        let driver = MemoryDriver::new();
        driver.apply_service(&spec("v1", 1, 5, 50)).await.unwrap();
        let target = Target::new("acme", "checkout", "v1");

        driver.adjust_scale(&target, 120).await.unwrap();
        assert_eq!(driver.ready_replicas(&target).await, Some(3));

        driver.adjust_scale(&target, 0).await.unwrap();
        assert_eq!(driver.ready_replicas(&target).await, Some(1));

        driver.adjust_scale(&target, 10_000).await.unwrap();
        assert_eq!(driver.ready_replicas(&target).await, Some(5));

        let adjustments = driver.adjustments().await;
        assert_eq!(
            adjustments.iter().map(|a| a.value).collect::<Vec<_>>(),
            vec![120, 0, 10_000]
        );
    }

    #[tokio::test]
    async fn test_scale_up_then_wait_succeeds() {
        let driver = MemoryDriver::new();
        driver.apply_service(&spec("v1", 0, 5, 50)).await.unwrap();
        let target = Target::new("acme", "checkout", "v1");

        assert_eq!(driver.ready_replicas(&target).await, Some(0));
        driver.scale_up(&target).await.unwrap();
        driver.wait_for_service(&target).await.unwrap();
        assert_eq!(driver.wait_calls(), 1);
    }

    #[tokio::test]
    async fn test_wait_failure_flag() {
        let driver = MemoryDriver::new();
        driver.apply_service(&spec("v1", 0, 5, 50)).await.unwrap();
        driver.set_wait_failure(true);

        let err = driver
            .wait_for_service(&Target::new("acme", "checkout", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_wait_for_unknown_version_is_not_found() {
        let driver = MemoryDriver::new();
        let err = driver
            .wait_for_service(&Target::new("acme", "checkout", "v9"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotFound(_)));
    }
}
