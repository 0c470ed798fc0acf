//! Route intent API endpoints.

use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use strato_model::{ReconciledRoute, Route};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::routing;
use crate::state::AppState;

/// Create route intent routes, nested alongside the service endpoints.
pub fn routes() -> Router<AppState> {
    Router::new().route("/{service}/routes", put(set_routes).get(get_routes))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SetRoutesRequest {
    pub routes: Vec<Route>,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    /// Intent as declared, when any was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<Vec<Route>>,

    /// Materialized routes currently pushed to the driver.
    pub routes: Vec<ReconciledRoute>,

    /// Revision of the materialized set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Replace a service's route intent.
///
/// PUT /v1/projects/{project}/services/{service}/routes
///
/// Validation failures leave both the declared intent and the pushed set
/// untouched.
async fn set_routes(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service)): Path<(String, String)>,
    Json(req): Json<SetRoutesRequest>,
) -> Result<Json<RoutesResponse>, ApiError> {
    let set = routing::sync_declared(
        &state.reconcile_ctx(),
        state.registry(),
        state.table(),
        state.driver().as_ref(),
        &project,
        &service,
        &req.routes,
    )
    .await
    .map_err(|error| ApiError::sync(error).with_request_id(ctx.request_id.clone()))?;

    state
        .registry()
        .set_routes(&project, &service, req.routes.clone())
        .await;

    tracing::info!(project, service, revision = %set.revision, "Updated route intent");

    Ok(Json(RoutesResponse {
        declared: Some(req.routes),
        routes: set.routes,
        revision: Some(set.revision),
    }))
}

/// Inspect a service's declared and materialized routes.
///
/// GET /v1/projects/{project}/services/{service}/routes
async fn get_routes(
    State(state): State<AppState>,
    Path((project, service)): Path<(String, String)>,
) -> Json<RoutesResponse> {
    let declared = state.registry().declared_routes(&project, &service).await;
    let current = state.table().current(&project, &service).await;

    let (routes, revision) = match current {
        Some(set) => (set.routes, Some(set.revision)),
        None => (Vec::new(), None),
    };

    Json(RoutesResponse {
        declared,
        routes,
        revision,
    })
}
