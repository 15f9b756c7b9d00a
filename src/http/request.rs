//! Request handling and transformation.
//!
//! # Responsibilities
//! - Resolve the correlation ID (reuse inbound, else synthesize)
//! - Carry the resolved caller identity between middleware and proxy
//! - Build the upstream URI from instance, target path and query
//!
//! # Design Decisions
//! - The query string is appended verbatim, never re-encoded
//! - Synthesized IDs are `gw-<epoch-millis>`

use axum::http::{HeaderMap, HeaderValue, Uri};
use chrono::Utc;

/// Header carrying the correlation ID.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Header carrying the authenticated user id to upstream services.
pub const X_USER_ID: &str = "x-user-id";

/// Identity of the caller, resolved by the rate-limit middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub ip: String,
    pub user_id: Option<String>,
}

/// Reuse the inbound correlation ID if present and valid.
pub fn correlation_id(headers: &HeaderMap) -> HeaderValue {
    match headers.get(X_CORRELATION_ID) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => synthesize_correlation_id(),
    }
}

fn synthesize_correlation_id() -> HeaderValue {
    let id = format!("gw-{}", Utc::now().timestamp_millis());
    // ASCII alphanumerics and '-' only.
    HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("gw-0"))
}

/// Join an instance base URL, a target path and an optional raw query.
pub fn upstream_uri(
    instance: &str,
    target_path: &str,
    query: Option<&str>,
) -> Result<Uri, axum::http::uri::InvalidUri> {
    let base = instance.trim_end_matches('/');
    let mut target = String::with_capacity(base.len() + target_path.len() + 16);
    target.push_str(base);
    if !target_path.starts_with('/') {
        target.push('/');
    }
    target.push_str(target_path);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }
    target.parse()
}
