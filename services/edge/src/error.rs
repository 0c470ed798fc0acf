//! RFC 7807 problem responses for the intercept path.
//!
//! A slimmer sibling of the runner's `ApiError`: the edge sits on the data
//! path and does not mint request ids, so the payload carries only the
//! problem itself.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
    pub retry_after_seconds: u32,
}

#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub problem: ProblemDetails,
}

impl ProxyError {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let problem = ProblemDetails {
            r#type: format!("https://strato.run/problems/{code}"),
            title: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
            retry_after_seconds: 0,
        };
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, detail)
    }

    pub fn bad_gateway(code: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut error = Self::new(StatusCode::BAD_GATEWAY, code, detail);
        error.problem.retryable = true;
        error
    }

    pub fn unavailable(code: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut error = Self::new(StatusCode::SERVICE_UNAVAILABLE, code, detail);
        error.problem.retryable = true;
        error.problem.retry_after_seconds = 1;
        error
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
