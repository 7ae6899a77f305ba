//! Probe executor.
//!
//! # Responsibilities
//! - Issue one HTTP GET against a service endpoint
//! - Classify the exchange into a verdict or a failure reason
//!
//! # Wire Contract
//! ```text
//! 200 + body "OK"    → OK
//! 200 + body "FAIL"  → FAIL
//! 200 + other body   → ProbeError::Protocol
//! non-200            → ProbeError::UnhealthyStatus (verdict FAIL)
//! connect/IO error   → ProbeError::Transport
//! deadline exceeded  → ProbeError::Timeout
//! ```

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper::header::USER_AGENT;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use url::Url;

use crate::registry::ServiceStatus;

/// Upper bound on the health response body we are willing to read.
const MAX_BODY_BYTES: usize = 1024;

/// Reasons a probe did not produce a well-formed verdict.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Endpoint is not an absolute http URL with host and port.
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: &'static str },

    /// Connection refused, DNS failure, reset, and similar.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the deadline.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// A 200 response whose body is not exactly `OK` or `FAIL`.
    #[error("unexpected health response body: {0:?}")]
    Protocol(String),

    /// The service answered with a non-200 status code.
    #[error("health endpoint returned status {0}")]
    UnhealthyStatus(u16),
}

impl ProbeError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidEndpoint { .. } => "invalid_endpoint",
            ProbeError::Transport(_) => "transport",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Protocol(_) => "protocol",
            ProbeError::UnhealthyStatus(_) => "unhealthy_status",
        }
    }
}

/// A single health check against one endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &Url) -> Result<ServiceStatus, ProbeError>;
}

/// Probe over plain HTTP/1.1 using the hyper client.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
    user_agent: String,
}

impl HttpProbe {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, endpoint: &Url) -> Result<ServiceStatus, ProbeError> {
        let request = Request::builder()
            .method("GET")
            .uri(endpoint.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Body::empty())
            .map_err(|_| ProbeError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: "request could not be built",
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeError::UnhealthyStatus(status.as_u16()));
        }

        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| ProbeError::Protocol(format!("unreadable body: {}", e)))?;

        parse_verdict(&body)
    }
}

/// Interpret a 200 response body.
pub fn parse_verdict(body: &[u8]) -> Result<ServiceStatus, ProbeError> {
    match body {
        b"OK" => Ok(ServiceStatus::Ok),
        b"FAIL" => Ok(ServiceStatus::Fail),
        other => {
            let mut text = String::from_utf8_lossy(other).into_owned();
            text.truncate(64);
            Err(ProbeError::Protocol(text))
        }
    }
}

/// Check that an endpoint can be probed.
pub fn validate_endpoint(endpoint: &Url) -> Result<(), ProbeError> {
    let invalid = |reason| ProbeError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason,
    };

    if endpoint.scheme() != "http" {
        return Err(invalid("only http endpoints can be probed"));
    }
    if endpoint.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if endpoint.port_or_known_default().is_none() {
        return Err(invalid("missing port"));
    }
    Ok(())
}

/// Validate `endpoint` and run `probe` against it within `deadline`.
pub async fn execute(
    probe: &dyn HealthProbe,
    endpoint: &Url,
    deadline: Duration,
) -> Result<ServiceStatus, ProbeError> {
    validate_endpoint(endpoint)?;

    match time::timeout(deadline, probe.probe(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(deadline)),
    }
}
