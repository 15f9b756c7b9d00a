//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from upstream responses
//! - Stamp gateway headers (service, response time, correlation ID)
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Status and body pass through unchanged

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response};

use crate::http::request::X_CORRELATION_ID;
use crate::security::headers::strip_hop_by_hop;

pub const X_GATEWAY_SERVICE: &str = "x-gateway-service";
pub const X_RESPONSE_TIME: &str = "x-response-time";

/// Milliseconds with two decimals, e.g. `12.34`.
pub fn format_response_time(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64() * 1000.0)
}

/// Prepare an upstream response for the client.
pub fn finish_upstream_response(
    mut response: Response<Body>,
    service: &str,
    elapsed: Duration,
    correlation_id: &HeaderValue,
) -> Response<Body> {
    let headers = response.headers_mut();
    strip_hop_by_hop(headers);

    if let Ok(value) = HeaderValue::from_str(service) {
        headers.insert(HeaderName::from_static(X_GATEWAY_SERVICE), value);
    }
    if let Ok(value) = HeaderValue::from_str(&format_response_time(elapsed)) {
        headers.insert(HeaderName::from_static(X_RESPONSE_TIME), value);
    }
    headers.insert(HeaderName::from_static(X_CORRELATION_ID), correlation_id.clone());
    response
}
