//! Route reconciliation and the table of materialized sets.
//!
//! Three events touch routes: a spec apply, a route update and a version
//! delete. Each recomputes the service's set, stores it and forwards it to
//! the driver only when the revision moved.

pub mod reconcile;
pub mod table;

pub use reconcile::{
    default_routes, patch_transitions, prune_version, reconcile_routes, ReconcileContext,
};
pub use table::{revision_for, ReconciledSet, RouteTable};

use thiserror::Error;

use strato_driver::{Driver, DriverError};
use strato_model::{ReconciledRoute, Route, RouteError, ServiceSpec, Target};

use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("route push failed: {0}")]
    Driver(#[from] DriverError),
}

/// Recompute a service's routes after one of its specs was applied.
///
/// An existing set is patched in place so only scale-to-zero transitions
/// move; the first apply materializes declared intent, or a catch-all
/// route per port when none was declared.
pub async fn sync_after_apply(
    ctx: &ReconcileContext<'_>,
    registry: &Registry,
    table: &RouteTable,
    driver: &dyn Driver,
    spec: &ServiceSpec,
) -> Result<ReconciledSet, SyncError> {
    let project = &spec.project;
    let service = &spec.service;
    let configs = registry.scale_configs(project, service).await;

    let routes = match table.current(project, service).await {
        Some(current) => patch_transitions(ctx, project, service, &current.routes, &configs),
        None => {
            let declared = match registry.declared_routes(project, service).await {
                Some(declared) => declared,
                None => default_routes(spec),
            };
            reconcile_routes(ctx, project, service, &declared, &configs)?
        }
    };

    push_if_changed(table, driver, project, service, routes).await
}

/// Rebuild a service's routes from freshly declared intent.
pub async fn sync_declared(
    ctx: &ReconcileContext<'_>,
    registry: &Registry,
    table: &RouteTable,
    driver: &dyn Driver,
    project: &str,
    service: &str,
    declared: &[Route],
) -> Result<ReconciledSet, SyncError> {
    let configs = registry.scale_configs(project, service).await;
    let routes = reconcile_routes(ctx, project, service, declared, &configs)?;
    push_if_changed(table, driver, project, service, routes).await
}

/// Drop a deleted version from its service's routes. Returns `None` when
/// the deletion emptied the set.
pub async fn sync_after_delete(
    table: &RouteTable,
    driver: &dyn Driver,
    target: &Target,
) -> Result<Option<ReconciledSet>, SyncError> {
    let Some(current) = table.current(&target.project, &target.service).await else {
        return Ok(None);
    };

    let pruned = prune_version(&current.routes, &target.version);
    if pruned.is_empty() {
        table.remove(&target.project, &target.service).await;
        driver
            .apply_routes(&target.project, &target.service, &[])
            .await?;
        tracing::debug!(target = %target, "Cleared route set with last version");
        return Ok(None);
    }

    let set = push_if_changed(table, driver, &target.project, &target.service, pruned).await?;
    Ok(Some(set))
}

/// Push a recomputed set, unless its revision already matches the table.
/// The table records the set only after the driver acknowledged it.
async fn push_if_changed(
    table: &RouteTable,
    driver: &dyn Driver,
    project: &str,
    service: &str,
    routes: Vec<ReconciledRoute>,
) -> Result<ReconciledSet, SyncError> {
    let revision = revision_for(&routes);
    if let Some(current) = table.current(project, service).await {
        if current.revision == revision {
            tracing::trace!(project, service, revision = %revision, "Route set unchanged");
            return Ok(current);
        }
    }

    driver.apply_routes(project, service, &routes).await?;

    let set = ReconciledSet { routes, revision };
    table.insert(project, service, set.clone()).await;
    tracing::debug!(
        project,
        service,
        revision = %set.revision,
        routes = set.routes.len(),
        "Pushed reconciled routes"
    );
    Ok(set)
}
