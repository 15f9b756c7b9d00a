//! Request forwarding to a resolved service instance.
//!
//! # Responsibilities
//! - Ask the registry for an instance of the target service
//! - Rewrite the request for the upstream (URI, headers, correlation ID)
//! - Feed the outcome back into the registry
//! - Translate transport failures into gateway errors
//!
//! # Design Decisions
//! - Exactly one upstream attempt per inbound request; recovery comes from the
//!   circuit breaker, not retries
//! - Bodies are streamed for write methods and dropped otherwise

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response};

use crate::error::GatewayError;
use crate::http::client::{TransportErrorKind, UpstreamClient};
use crate::http::request::{correlation_id, upstream_uri, CallerIdentity, X_CORRELATION_ID, X_USER_ID};
use crate::http::response::finish_upstream_response;
use crate::registry::{SelectError, ServiceRegistry};
use crate::security::headers::without_hop_by_hop;

/// Forwards requests to services registered in a `ServiceRegistry`.
#[derive(Clone)]
pub struct ServiceProxy {
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

impl ServiceProxy {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        client: Arc<dyn UpstreamClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Forward `request` to `service`, replacing its path with `target_path`.
    pub async fn forward(
        &self,
        request: Request<Body>,
        service: &str,
        target_path: &str,
    ) -> Result<Response<Body>, GatewayError> {
        let instance = self.registry.select_instance(service).map_err(|e| {
            tracing::debug!(service = %service, reason = %e, "Service not routable");
            match e {
                SelectError::ServiceNotFound(name) => GatewayError::ServiceNotFound(name),
                SelectError::Unavailable {
                    service,
                    circuit_open: true,
                } => GatewayError::CircuitOpen(service),
                SelectError::Unavailable { service, .. } => GatewayError::Unavailable(service),
            }
        })?;

        let (parts, body) = request.into_parts();
        let method = parts.method.clone();

        let uri = upstream_uri(&instance, target_path, parts.uri.query()).map_err(|e| {
            tracing::error!(service = %service, instance = %instance, error = %e, "Invalid upstream URI");
            GatewayError::InvalidUpstreamUri(service.to_string())
        })?;

        let correlation_id = correlation_id(&parts.headers);
        let mut headers = without_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        headers.insert(HeaderName::from_static(X_CORRELATION_ID), correlation_id.clone());

        if let Some(user_id) = parts
            .extensions
            .get::<CallerIdentity>()
            .and_then(|identity| identity.user_id.as_deref())
        {
            if let Ok(value) = HeaderValue::from_str(user_id) {
                headers.insert(HeaderName::from_static(X_USER_ID), value);
            }
        }

        let body = if carries_body(&method) {
            body
        } else {
            headers.remove(header::CONTENT_LENGTH);
            Body::empty()
        };

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method.clone();
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let start = Instant::now();
        match self.client.send(outbound, self.timeout).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                self.registry.record_success(service, elapsed);

                tracing::info!(
                    service = %service,
                    method = %method,
                    path = %target_path,
                    status = response.status().as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    correlation_id = ?correlation_id,
                    "Proxied request successfully"
                );

                Ok(finish_upstream_response(response, service, elapsed, &correlation_id))
            }
            Err(e) => {
                self.registry.record_failure(service);

                tracing::error!(
                    service = %service,
                    method = %method,
                    path = %target_path,
                    kind = ?e.kind,
                    error = %e.message,
                    correlation_id = ?correlation_id,
                    "Upstream request failed"
                );

                Err(match e.kind {
                    TransportErrorKind::Timeout => GatewayError::UpstreamTimeout(service.to_string()),
                    TransportErrorKind::Connect => {
                        GatewayError::UpstreamUnreachable(service.to_string())
                    }
                    TransportErrorKind::Other => GatewayError::UpstreamError(service.to_string()),
                })
            }
        }
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
