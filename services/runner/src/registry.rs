//! Declared state: service specs and route intents as last applied.
//!
//! The registry is the control plane's source of truth for what operators
//! asked for. What the driver currently runs is its own business; route
//! reconciliation reads minimums from here, not from the substrate.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use strato_model::{Route, ScaleConfig, ServiceSpec, Target};

fn service_key(project: &str, service: &str) -> String {
    format!("{project}/{service}")
}

#[derive(Default)]
pub struct Registry {
    services: RwLock<HashMap<String, BTreeMap<String, ServiceSpec>>>,
    routes: RwLock<HashMap<String, Vec<Route>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_service(&self, spec: ServiceSpec) {
        let key = service_key(&spec.project, &spec.service);
        let mut services = self.services.write().await;
        services
            .entry(key)
            .or_default()
            .insert(spec.version.clone(), spec);
    }

    /// Remove one version. Returns false when it was not declared. The
    /// service's route intent goes with its last version.
    pub async fn remove_service(&self, target: &Target) -> bool {
        let key = target.service_key();
        let mut services = self.services.write().await;
        let Some(versions) = services.get_mut(&key) else {
            return false;
        };
        if versions.remove(&target.version).is_none() {
            return false;
        }
        if versions.is_empty() {
            services.remove(&key);
            self.routes.write().await.remove(&key);
        }
        true
    }

    pub async fn service(&self, target: &Target) -> Option<ServiceSpec> {
        let services = self.services.read().await;
        services
            .get(&target.service_key())
            .and_then(|versions| versions.get(&target.version))
            .cloned()
    }

    /// Every declared version of one service, oldest version id first.
    pub async fn versions(&self, project: &str, service: &str) -> Vec<ServiceSpec> {
        let services = self.services.read().await;
        services
            .get(&service_key(project, service))
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every declared spec in a project.
    pub async fn project_services(&self, project: &str) -> Vec<ServiceSpec> {
        let prefix = format!("{project}/");
        let services = self.services.read().await;
        let mut specs: Vec<ServiceSpec> = services
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .flat_map(|(_, versions)| versions.values().cloned())
            .collect();
        specs.sort_by(|a, b| (&a.service, &a.version).cmp(&(&b.service, &b.version)));
        specs
    }

    /// Declared scale config per version of one service.
    pub async fn scale_configs(&self, project: &str, service: &str) -> BTreeMap<String, ScaleConfig> {
        let services = self.services.read().await;
        services
            .get(&service_key(project, service))
            .map(|versions| {
                versions
                    .iter()
                    .map(|(version, spec)| (version.clone(), spec.scale.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn set_routes(&self, project: &str, service: &str, routes: Vec<Route>) {
        let mut declared = self.routes.write().await;
        declared.insert(service_key(project, service), routes);
    }

    /// Route intent for one service, if any was ever declared.
    pub async fn declared_routes(&self, project: &str, service: &str) -> Option<Vec<Route>> {
        let declared = self.routes.read().await;
        declared.get(&service_key(project, service)).cloned()
    }
}
