//! Gateway error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced to gateway callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("No route matches {0}")]
    RouteNotFound(String),
    #[error("Service {0} is not registered")]
    ServiceNotFound(String),
    #[error("Service {0} is temporarily unavailable (circuit breaker open)")]
    CircuitOpen(String),
    #[error("Service {0} is not available")]
    Unavailable(String),
    #[error("Service {0} request timeout")]
    UpstreamTimeout(String),
    #[error("Cannot connect to service {0}")]
    UpstreamUnreachable(String),
    #[error("Error communicating with service {0}")]
    UpstreamError(String),
    #[error("Invalid upstream address for service {0}")]
    InvalidUpstreamUri(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ServiceNotFound(_)
            | GatewayError::CircuitOpen(_)
            | GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable(_)
            | GatewayError::UpstreamError(_)
            | GatewayError::InvalidUpstreamUri(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Routing errors are steady-state conditions, not faults.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            GatewayError::RouteNotFound(_)
                | GatewayError::ServiceNotFound(_)
                | GatewayError::CircuitOpen(_)
                | GatewayError::Unavailable(_)
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let svc = || "user-service".to_string();
        assert_eq!(GatewayError::ServiceNotFound(svc()).status_code(), 503);
        assert_eq!(GatewayError::Unavailable(svc()).status_code(), 503);
        assert_eq!(GatewayError::CircuitOpen(svc()).status_code(), 503);
        assert_eq!(GatewayError::UpstreamTimeout(svc()).status_code(), 504);
        assert_eq!(GatewayError::UpstreamUnreachable(svc()).status_code(), 502);
        assert_eq!(GatewayError::UpstreamError(svc()).status_code(), 502);
        assert_eq!(GatewayError::RouteNotFound("/x".into()).status_code(), 404);
    }

    #[test]
    fn test_routing_vs_transport() {
        assert!(GatewayError::CircuitOpen("a".into()).is_routing());
        assert!(!GatewayError::UpstreamTimeout("a".into()).is_routing());
    }

    #[test]
    fn test_breaker_message() {
        let msg = GatewayError::CircuitOpen("order-service".into()).to_string();
        assert!(msg.contains("circuit breaker open"));
    }
}
