//! Driver passthrough endpoints.
//!
//! Remote edges drive activation through these instead of talking to a
//! substrate directly: the HTTP driver client pointed at a runner lands
//! here, and the runner forwards to whatever driver it was configured
//! with. Scale-up additionally records activation intent for the scaler,
//! and readiness waits are coalesced so a stampede of cold requests costs
//! one driver wait.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use strato_driver::AdjustScaleRequest;
use strato_gate::GateError;
use strato_model::{ScaleConfig, Target};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create driver passthrough routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/{project}/services/{service}/scale", get(scale_configs))
        .route(
            "/projects/{project}/services/{service}/versions/{version}/adjust",
            post(adjust_scale),
        )
        .route(
            "/projects/{project}/services/{service}/versions/{version}/scale-up",
            post(scale_up),
        )
        .route(
            "/projects/{project}/services/{service}/versions/{version}/wait",
            post(wait_for_service),
        )
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /v1/driver/projects/{project}/services/{service}/scale
async fn scale_configs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service)): Path<(String, String)>,
) -> Result<Json<BTreeMap<String, ScaleConfig>>, ApiError> {
    state
        .driver()
        .scale_configs(&project, &service)
        .await
        .map(Json)
        .map_err(|error| ApiError::driver(error).with_request_id(ctx.request_id))
}

/// POST /v1/driver/projects/{project}/services/{service}/versions/{version}/adjust
async fn adjust_scale(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
    Json(req): Json<AdjustScaleRequest>,
) -> Result<StatusCode, ApiError> {
    let target = Target::new(project, service, version);
    state
        .driver()
        .adjust_scale(&target, req.value)
        .await
        .map_err(|error| ApiError::driver(error).with_request_id(ctx.request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/driver/projects/{project}/services/{service}/versions/{version}/scale-up
async fn scale_up(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let target = Target::new(project, service, version);
    state.bridge().notify(&target);

    state
        .driver()
        .scale_up(&target)
        .await
        .map_err(|error| ApiError::driver(error).with_request_id(ctx.request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/driver/projects/{project}/services/{service}/versions/{version}/wait
///
/// Concurrent waits for the same version share one driver call.
async fn wait_for_service(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((project, service, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let target = Target::new(project, service, version);
    let driver = Arc::clone(state.driver());

    let wait_target = target.clone();
    let outcome = state
        .wait_gate()
        .wait(target.to_string(), async move {
            driver
                .wait_for_service(&wait_target)
                .await
                .map_err(Arc::new)
        })
        .await;

    match outcome {
        Ok(Ok(())) => Ok(StatusCode::NO_CONTENT),
        Ok(Err(error)) => {
            Err(ApiError::driver_ref(&error).with_request_id(ctx.request_id))
        }
        Err(GateError::Abandoned) => Err(ApiError::unavailable(
            "activation_abandoned",
            format!("readiness wait for ({target}) was abandoned"),
        )
        .with_request_id(ctx.request_id)),
    }
}
