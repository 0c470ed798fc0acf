//! Upstream forwarding with not-ready retries.
//!
//! After activation the workload's server may still be binding its port, so
//! the first forwarded attempts can land on a connection that answers 404 or
//! 503 from the substrate's routing layer rather than the app. Those two
//! statuses are treated as not-ready signals and retried on a short fixed
//! backoff; every other status belongs to the application and relays as-is.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, CONNECTION, CONTENT_LENGTH, HOST, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use reqwest::{Method, StatusCode};
use tracing::debug;

use strato_model::{ForwardInfo, FORWARD_HEADERS};

/// Total attempts for one indirected request.
pub const FORWARD_ATTEMPTS: u32 = 5;

/// Fixed delay between not-ready retries.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(350);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upstream HTTP client for the intercept path.
///
/// No total request timeout is set: forwarded responses stream and may
/// legitimately run long. Only connection establishment is bounded.
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("strato-edge/0.1.0")
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Send the buffered request to the recovered destination.
    ///
    /// Retries only the two not-ready statuses; the final attempt's response
    /// is returned whatever its status. Transport errors are not retried.
    pub async fn forward(
        &self,
        info: &ForwardInfo,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("http://{}:{}{}", info.host, info.port, path_and_query);

        let mut attempt = 1;
        loop {
            let response = self
                .client
                .request(method.clone(), &url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await?;

            let status = response.status();
            let not_ready =
                status == StatusCode::NOT_FOUND || status == StatusCode::SERVICE_UNAVAILABLE;
            if !not_ready || attempt >= FORWARD_ATTEMPTS {
                return Ok(response);
            }

            debug!(
                url = %url,
                status = status.as_u16(),
                attempt,
                "Upstream not ready, retrying"
            );
            attempt += 1;
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }
}

/// Drop headers that must not travel to the upstream: the forwarded-metadata
/// set, the original host, and hop-by-hop headers. The client rebuilds host
/// and content-length for the new connection.
pub fn sanitize_headers(headers: &mut HeaderMap) {
    for name in FORWARD_HEADERS {
        headers.remove(name);
    }
    headers.remove(HOST);
    headers.remove(CONNECTION);
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(TE);
    headers.remove(TRAILER);
    headers.remove(UPGRADE);
    headers.remove("proxy-connection");
    headers.remove("keep-alive");
}
