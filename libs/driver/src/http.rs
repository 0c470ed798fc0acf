//! Driver client speaking the HTTP wire surface of a substrate agent.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;

use strato_model::{ReconciledRoute, ScaleConfig, ServiceSpec, Target};

use crate::{AdjustScaleRequest, ApplyRoutesRequest, Driver, DriverError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Driver backed by a remote agent (or a runner's driver passthrough).
pub struct HttpDriver {
    client: reqwest::Client,
    base_url: String,
    wait_timeout: Duration,
}

impl HttpDriver {
    /// Build a client for `base_url`.
    ///
    /// `wait_timeout` bounds only [`Driver::wait_for_service`]; every other
    /// call uses a short request timeout.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<&str>,
        wait_timeout: Duration,
    ) -> Result<Self, DriverError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = if token.starts_with("Bearer ") {
                token.to_string()
            } else {
                format!("Bearer {token}")
            };
            let mut value = HeaderValue::from_str(&value)
                .map_err(|_| DriverError::Config("driver token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent("strato-driver/0.1.0")
            .default_headers(headers)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wait_timeout,
        })
    }

    fn service_url(&self, project: &str, service: &str, suffix: &str) -> String {
        format!(
            "{}/v1/driver/projects/{project}/services/{service}{suffix}",
            self.base_url
        )
    }

    fn version_url(&self, target: &Target, suffix: &str) -> String {
        self.service_url(
            &target.project,
            &target.service,
            &format!("/versions/{}{suffix}", target.version),
        )
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DriverError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(DriverError::NotFound(body)),
            StatusCode::SERVICE_UNAVAILABLE => Err(DriverError::Unavailable(body)),
            _ => Err(DriverError::Http {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl Driver for HttpDriver {
    async fn apply_service(&self, spec: &ServiceSpec) -> Result<(), DriverError> {
        let url = self.version_url(&spec.target(), "");
        let response = self.client.put(url).json(spec).send().await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    async fn delete_service(&self, target: &Target) -> Result<(), DriverError> {
        let url = self.version_url(target, "");
        let response = self.client.delete(url).send().await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    async fn scale_configs(
        &self,
        project: &str,
        service: &str,
    ) -> Result<BTreeMap<String, ScaleConfig>, DriverError> {
        let url = self.service_url(project, service, "/scale");
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn adjust_scale(&self, target: &Target, value: i64) -> Result<(), DriverError> {
        let url = self.version_url(target, "/adjust");
        let response = self
            .client
            .post(url)
            .json(&AdjustScaleRequest { value })
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    async fn wait_for_service(&self, target: &Target) -> Result<(), DriverError> {
        let url = self.version_url(target, "/wait");
        debug!(target = %target, timeout = ?self.wait_timeout, "Waiting for service readiness");
        let response = self
            .client
            .post(url)
            .timeout(self.wait_timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    DriverError::Timeout(target.to_string())
                } else {
                    DriverError::from(error)
                }
            })?;
        Self::ensure_success(response).await.map(|_| ())
    }

    async fn scale_up(&self, target: &Target) -> Result<(), DriverError> {
        let url = self.version_url(target, "/scale-up");
        debug!(target = %target, "Signaling scale-up");
        let response = self.client.post(url).send().await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    async fn apply_routes(
        &self,
        project: &str,
        service: &str,
        routes: &[ReconciledRoute],
    ) -> Result<(), DriverError> {
        let url = self.service_url(project, service, "/routes");
        let response = self
            .client
            .put(url)
            .json(&ApplyRoutesRequest {
                routes: routes.to_vec(),
            })
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }
}
