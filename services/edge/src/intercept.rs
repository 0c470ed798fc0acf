//! The activation request path.
//!
//! Every request reaching the edge came through the mesh indirection and
//! carries the five forwarded-destination headers. The handler recovers the
//! true destination, wakes the workload, waits for readiness behind the
//! single-flight gate and forwards the request, streaming the upstream
//! response back.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use strato_gate::GateError;
use strato_model::{ActivitySample, ForwardInfo};

use crate::error::ProxyError;
use crate::forward;
use crate::inflight::InflightGuard;
use crate::state::EdgeState;

/// Create the edge router: one fallback handler owns every path.
pub fn create_router(state: EdgeState) -> Router {
    Router::new()
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn intercept(State(state): State<EdgeState>, req: Request) -> Response {
    let recovered =
        ForwardInfo::from_lookup(|name| req.headers().get(name).and_then(|v| v.to_str().ok()));

    let info = match recovered {
        Ok(info) => info,
        Err(error) => {
            // Probes hit the edge directly and carry no metadata.
            if req.uri().path() == "/healthz" {
                return StatusCode::OK.into_response();
            }
            debug!(path = %req.uri().path(), error = %error, "Rejecting unindirected request");
            return ProxyError::bad_request("invalid_forward_metadata", error.to_string())
                .into_response();
        }
    };

    match proxy(state, info, req).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn proxy(
    state: EdgeState,
    info: ForwardInfo,
    req: Request,
) -> Result<Response, ProxyError> {
    let target = info.target();

    let (guard, inflight) = state.inflight().begin(&target);
    state.offer_sample(ActivitySample::now(&target, state.node_id(), inflight));

    state.driver().scale_up(&target).await.map_err(|error| {
        warn!(target = %target, error = %error, "Scale-up failed");
        ProxyError::unavailable(
            "activation_failed",
            format!("scale-up for {target} failed: {error}"),
        )
    })?;

    let driver = Arc::clone(state.driver());
    let wait_target = target.clone();
    let outcome = state
        .gate()
        .wait(target.service_key(), async move {
            driver.wait_for_service(&wait_target).await.map_err(Arc::new)
        })
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(target = %target, error = %error, "Readiness wait failed");
            return Err(ProxyError::unavailable(
                "activation_failed",
                format!("activation for {target} failed: {error}"),
            ));
        }
        Err(GateError::Abandoned) => {
            warn!(target = %target, "Readiness wait abandoned");
            return Err(ProxyError::unavailable(
                "activation_abandoned",
                format!("activation for {target} was abandoned"),
            ));
        }
    }

    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    // Buffered once so not-ready retries can resend it.
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|error| ProxyError::bad_request("unreadable_body", error.to_string()))?;

    let mut headers = parts.headers;
    forward::sanitize_headers(&mut headers);

    let response = state
        .forwarder()
        .forward(&info, parts.method, &path_and_query, headers, body)
        .await
        .map_err(|error| {
            warn!(target = %target, error = %error, "Upstream unreachable");
            ProxyError::bad_gateway(
                "upstream_unreachable",
                format!("forward to {}:{} failed: {error}", info.host, info.port),
            )
        })?;

    Ok(relay(response, guard))
}

/// Relay the upstream response verbatim, streaming the body.
///
/// The in-flight guard rides inside the stream so the count drops when the
/// body finishes or the client goes away, not when headers are written.
fn relay(response: reqwest::Response, guard: InflightGuard) -> Response {
    let status = response.status();
    let mut headers = response.headers().clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);

    let stream = response.bytes_stream().inspect(move |_| {
        let _ = &guard;
    });

    let mut relayed = Response::new(Body::from_stream(stream));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}
