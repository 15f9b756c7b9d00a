//! Outbound HTTP client.
//!
//! # Responsibilities
//! - Issue upstream requests with an explicit deadline
//! - Classify transport failures as timeout, connect or other
//!
//! # Design Decisions
//! - One pooled client shared by the proxy and the health monitor
//! - Callers switch on `TransportErrorKind`, never on error types
//! - The deadline covers the whole exchange: response bodies are buffered
//!   before `send` returns, so a stalled body fails the call instead of
//!   hanging the caller

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Transport failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The deadline elapsed before the full response arrived.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// Any other I/O or protocol failure.
    Other,
}

/// A failed upstream exchange.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }
}

/// Sends requests to upstream services.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send `request`, failing with `Timeout` if the complete response does
    /// not arrive within `timeout`.
    async fn send(
        &self,
        request: Request<Body>,
        timeout: Duration,
    ) -> Result<Response<Body>, TransportError>;
}

/// Pooled hyper client.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
}

impl HyperUpstream {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .build(connector);

        Self { client }
    }
}

impl Default for HyperUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for HyperUpstream {
    async fn send(
        &self,
        request: Request<Body>,
        timeout: Duration,
    ) -> Result<Response<Body>, TransportError> {
        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                let kind = if e.is_connect() {
                    TransportErrorKind::Connect
                } else {
                    TransportErrorKind::Other
                };
                TransportError::new(kind, e.to_string())
            })?;

            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(|e| {
                    TransportError::new(TransportErrorKind::Other, format!("reading body: {e}"))
                })?;
            Ok::<_, TransportError>(Response::from_parts(parts, Body::from(bytes)))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(timeout)),
        }
    }
}
