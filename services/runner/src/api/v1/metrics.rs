//! Activity sample ingest endpoint.
//!
//! Reporting edges POST newline-delimited JSON, one sample per line. The
//! endpoint parses and authenticates synchronously but hands storage to
//! the ingest pool, so a slow store never backs up into reporters.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

use strato_model::ActivitySample;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::auth::{AuthError, NodeClaims};
use crate::state::AppState;

/// Create sample ingest routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(ingest_samples))
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct IngestResponse {
    /// Samples queued for storage.
    pub accepted: usize,

    /// Samples outside the caller's claims.
    pub rejected: usize,

    /// Samples dropped because the queue was full.
    pub shed: usize,
}

/// Ingest a batch of activity samples.
///
/// POST /v1/metrics
async fn ingest_samples(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: String,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let claims = state.verifier().verify(ctx.token()).map_err(|error| {
        let api_error = match error {
            AuthError::MissingToken => {
                ApiError::unauthorized("missing_token", "sample ingest requires a bearer token")
            }
            AuthError::InvalidToken => {
                ApiError::unauthorized("invalid_token", "bearer token was rejected")
            }
        };
        api_error.with_request_id(ctx.request_id.clone())
    })?;

    let mut response = IngestResponse {
        accepted: 0,
        rejected: 0,
        shed: 0,
    };

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let sample: ActivitySample = serde_json::from_str(line).map_err(|error| {
            ApiError::bad_request(
                "invalid_sample",
                format!("line {}: {error}", index + 1),
            )
            .with_request_id(ctx.request_id.clone())
        })?;

        if let Some(claims) = &claims {
            if !claims_cover(claims, &sample) {
                response.rejected += 1;
                continue;
            }
        }

        if state.ingest().offer(sample) {
            response.accepted += 1;
        } else {
            response.shed += 1;
        }
    }

    if response.rejected > 0 {
        tracing::warn!(
            request_id = %ctx.request_id,
            rejected = response.rejected,
            "Rejected samples outside caller claims"
        );
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn claims_cover(claims: &NodeClaims, sample: &ActivitySample) -> bool {
    claims.node_id == sample.node_id
        && claims.project == sample.project
        && claims.service == sample.service
        && claims.version == sample.version
}

#[cfg(test)]
mod tests {
    use strato_model::Target;

    use super::*;

    #[test]
    fn test_claims_must_match_all_identity_fields() {
        let claims = NodeClaims {
            node_id: "node-a".into(),
            project: "acme".into(),
            service: "checkout".into(),
            version: "v1".into(),
        };
        let sample = ActivitySample::now(&Target::new("acme", "checkout", "v1"), "node-a", 3);
        assert!(claims_cover(&claims, &sample));

        let other_node = ActivitySample::now(&Target::new("acme", "checkout", "v1"), "node-b", 3);
        assert!(!claims_cover(&claims, &other_node));

        let other_version = ActivitySample::now(&Target::new("acme", "checkout", "v2"), "node-a", 3);
        assert!(!claims_cover(&claims, &other_version));
    }
}
