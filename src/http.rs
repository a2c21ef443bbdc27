//! HTTP GET for the health endpoints.
//!
//! The body is always read to the end before a probe sees the response, so
//! the connection goes back to the pool (or is closed) before the next step.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::ProbeError;
use crate::Result;

/// Status and fully-read body of a GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Response with status 200 and the given body
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Trait abstracting HTTP GET requests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return its status and body.
    ///
    /// Any status is returned as a response; only transport failures are errors.
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, ProbeError>;
}

/// [`HttpClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with a per-request timeout.
    ///
    /// The scheduler and controller-manager serve self-signed certificates, so
    /// `insecure_skip_tls_verify` is normally on.
    pub fn new(timeout: Duration, insecure_skip_tls_verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, ProbeError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::invocation(format!("GET {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::invocation(format!("reading body of {url} failed: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}
