//! Service deployment API endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use strato_model::{PortSpec, ReconciledRoute, ScaleConfig, ServiceSpec, Target};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::routing;
use crate::state::AppState;

/// Create service routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_services))
        .route(
            "/{service}/versions/{version}",
            put(apply_service).get(get_service).delete(delete_service),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of a spec apply. Identity comes from the path.
#[derive(Debug, Deserialize)]
pub struct ApplyServiceRequest {
    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyServiceResponse {
    /// The spec as declared.
    pub service: ServiceSpec,

    /// Routes currently materialized for the whole service.
    pub routes: Vec<ReconciledRoute>,

    /// Revision of the materialized set.
    pub revision: String,
}

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub service: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListServicesResponse {
    pub items: Vec<ServiceSpec>,
    pub total: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// Declare and materialize one service version.
///
/// PUT /v1/projects/{project}/services/{service}/versions/{version}
async fn apply_service(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
    Json(req): Json<ApplyServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for port in &req.ports {
        if port.port == 0 {
            return Err(ApiError::bad_request(
                "invalid_port",
                format!("port ({}) cannot be zero", port.name),
            )
            .with_request_id(ctx.request_id.clone()));
        }
    }

    let spec = ServiceSpec {
        project,
        service,
        version,
        scale: req.scale,
        ports: req.ports,
        labels: req.labels,
    };

    state
        .driver()
        .apply_service(&spec)
        .await
        .map_err(|error| ApiError::driver(error).with_request_id(ctx.request_id.clone()))?;
    state.registry().upsert_service(spec.clone()).await;

    let set = routing::sync_after_apply(
        &state.reconcile_ctx(),
        state.registry(),
        state.table(),
        state.driver().as_ref(),
        &spec,
    )
    .await
    .map_err(|error| ApiError::sync(error).with_request_id(ctx.request_id.clone()))?;

    tracing::info!(target = %spec.target(), revision = %set.revision, "Applied service spec");

    Ok(Json(ApplyServiceResponse {
        service: spec,
        routes: set.routes,
        revision: set.revision,
    }))
}

/// Fetch one declared version.
///
/// GET /v1/projects/{project}/services/{service}/versions/{version}
async fn get_service(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
) -> Result<Json<ServiceSpec>, ApiError> {
    let target = Target::new(project, service, version);
    state.registry().service(&target).await.map(Json).ok_or_else(|| {
        ApiError::not_found("unknown_service", format!("service ({target}) is not declared"))
            .with_request_id(ctx.request_id)
    })
}

/// Remove one version and its compute.
///
/// DELETE /v1/projects/{project}/services/{service}/versions/{version}
async fn delete_service(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let target = Target::new(project, service, version);

    if !state.registry().remove_service(&target).await {
        return Err(ApiError::not_found(
            "unknown_service",
            format!("service ({target}) is not declared"),
        )
        .with_request_id(ctx.request_id.clone()));
    }

    state
        .driver()
        .delete_service(&target)
        .await
        .map_err(|error| ApiError::driver(error).with_request_id(ctx.request_id.clone()))?;
    state.bridge().remove_target(&target);

    routing::sync_after_delete(state.table(), state.driver().as_ref(), &target)
        .await
        .map_err(|error| ApiError::sync(error).with_request_id(ctx.request_id.clone()))?;

    tracing::info!(target = %target, "Deleted service version");
    Ok(StatusCode::NO_CONTENT)
}

/// List declared specs, optionally filtered to a service or version.
///
/// GET /v1/projects/{project}/services
async fn list_services(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(project): Path<String>,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<ListServicesResponse>, ApiError> {
    let items = match (query.service, query.version) {
        (Some(service), Some(version)) => {
            let target = Target::new(&project, &service, &version);
            let spec = state.registry().service(&target).await.ok_or_else(|| {
                ApiError::not_found(
                    "unknown_service",
                    format!("service ({target}) is not declared"),
                )
                .with_request_id(ctx.request_id)
            })?;
            vec![spec]
        }
        (Some(service), None) => state.registry().versions(&project, &service).await,
        (None, _) => state.registry().project_services(&project).await,
    };

    let total = items.len();
    Ok(Json(ListServicesResponse { items, total }))
}
