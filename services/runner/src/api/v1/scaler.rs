//! External scaler endpoints.
//!
//! The autoscaler talks to these four operations: a metric spec per
//! workload, live metric values, a point-in-time activity answer and a
//! push stream of activation events. The workload identity and scaling
//! policy ride in the scaler metadata map, so the runner never needs the
//! scaler's own object names.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use strato_model::{ScaleMode, Target};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::bridge::ActivationStream;
use crate::metrics::{to_adjust_value, WindowSet};
use crate::state::AppState;

/// Create external scaler routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/metric-spec", post(metric_spec))
        .route("/metrics", post(metrics))
        .route("/is-active", post(is_active))
        .route("/stream", get(stream_activity))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectRef {
    #[serde(default)]
    pub scaler_metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMetricsRequest {
    pub scaled_object_ref: ScaledObjectRef,
    pub metric_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpecResponse {
    pub metric_specs: Vec<MetricSpec>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub metric_name: String,
    pub target_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub metric_values: Vec<MetricValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub metric_name: String,
    pub metric_value: i64,
}

#[derive(Debug, Serialize)]
pub struct IsActiveResponse {
    pub result: bool,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub project: String,
    pub service: String,
    pub version: String,
}

// =============================================================================
// Metadata helpers
// =============================================================================

fn require<'a>(
    metadata: &'a HashMap<String, String>,
    key: &str,
    request_id: &str,
) -> Result<&'a str, ApiError> {
    metadata
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request(
                "invalid_scaler_metadata",
                format!("scaler metadata is missing required key ({key})"),
            )
            .with_request_id(request_id.to_string())
        })
}

fn target_from(
    metadata: &HashMap<String, String>,
    request_id: &str,
) -> Result<Target, ApiError> {
    Ok(Target::new(
        require(metadata, "project", request_id)?,
        require(metadata, "service", request_id)?,
        require(metadata, "version", request_id)?,
    ))
}

fn integer_from(
    metadata: &HashMap<String, String>,
    key: &str,
    request_id: &str,
) -> Result<i64, ApiError> {
    let raw = require(metadata, key, request_id)?;
    raw.parse().map_err(|_| {
        ApiError::bad_request(
            "invalid_scaler_metadata",
            format!("scaler metadata key ({key}) must be an integer, got ({raw})"),
        )
        .with_request_id(request_id.to_string())
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Describe the metric one workload scales on.
///
/// POST /v1/scaler/metric-spec
async fn metric_spec(
    State(_state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<ScaledObjectRef>,
) -> Result<Json<MetricSpecResponse>, ApiError> {
    let metadata = &req.scaler_metadata;
    target_from(metadata, &ctx.request_id)?;

    let mode: ScaleMode = require(metadata, "type", &ctx.request_id)?
        .parse()
        .map_err(|error: strato_model::ParseScaleModeError| {
            ApiError::bad_request("invalid_scaler_metadata", error.to_string())
                .with_request_id(ctx.request_id.clone())
        })?;
    let target_size = integer_from(metadata, "target", &ctx.request_id)?;

    Ok(Json(MetricSpecResponse {
        metric_specs: vec![MetricSpec {
            metric_name: mode.as_str().to_string(),
            target_size,
        }],
    }))
}

/// Report the live metric value for one workload.
///
/// POST /v1/scaler/metrics
async fn metrics(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<GetMetricsRequest>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let target = target_from(&req.scaled_object_ref.scaler_metadata, &ctx.request_id)?;

    let records = state.store().replay().await.map_err(|error| {
        ApiError::unavailable("store_unavailable", error.to_string())
            .with_request_id(ctx.request_id.clone())
    })?;
    let windows = WindowSet::build(&records, Utc::now().timestamp());
    let value = windows.value_for(&target).unwrap_or(0.0);

    Ok(Json(MetricsResponse {
        metric_values: vec![MetricValue {
            metric_name: req.metric_name,
            metric_value: to_adjust_value(value),
        }],
    }))
}

/// Answer whether one workload should be scaled above zero right now.
///
/// POST /v1/scaler/is-active
async fn is_active(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<ScaledObjectRef>,
) -> Result<Json<IsActiveResponse>, ApiError> {
    let metadata = &req.scaler_metadata;
    let target = target_from(metadata, &ctx.request_id)?;
    let min_replicas = integer_from(metadata, "minReplicas", &ctx.request_id)? as i32;

    Ok(Json(IsActiveResponse {
        result: state.bridge().is_active(&target, min_replicas),
    }))
}

/// Push activation events as NDJSON until the workload is torn down or
/// the scaler disconnects.
///
/// GET /v1/scaler/stream?project=&service=&version=
async fn stream_activity(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let target = Target::new(query.project, query.service, query.version);
    let stream = state.bridge().subscribe(&target);
    tracing::debug!(target = %target, "Scaler stream attached");

    // A `false` event is the teardown marker: forward it, then end the
    // stream. Dropping the subscription on disconnect unregisters it.
    let lines = futures_util::stream::unfold(Some(stream), |slot| async move {
        let mut stream: ActivationStream = slot?;
        match stream.recv().await {
            Some(event) => {
                let next = if event { Some(stream) } else { None };
                Some((Ok::<Bytes, Infallible>(event_line(event)), next))
            }
            None => None,
        }
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
}

fn event_line(result: bool) -> Bytes {
    let mut line = serde_json::to_string(&IsActiveResponse { result })
        .unwrap_or_else(|_| r#"{"result":false}"#.to_string());
    line.push('\n');
    Bytes::from(line)
}
