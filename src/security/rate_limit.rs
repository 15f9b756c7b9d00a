//! Rate limiting middleware.
//!
//! Checks the per-IP window first and the per-user window second. The
//! caller identity resolved here is attached to the request for the proxy.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::http::request::CallerIdentity;
use crate::observability::metrics;
use crate::ratelimit::{QuotaSnapshot, RateLimitDecision, RateLimiter};
use crate::security::headers::client_ip;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Shared state for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    user_id_header: Option<HeaderName>,
    exempt_paths: Arc<HashSet<String>>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, config: &RateLimitConfig) -> Self {
        Self {
            limiter,
            user_id_header: HeaderName::try_from(config.user_id_header.as_str()).ok(),
            exempt_paths: Arc::new(config.exempt_paths.iter().cloned().collect()),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn user_id(&self, headers: &HeaderMap) -> Option<String> {
        let name = self.user_id_header.as_ref()?;
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Middleware function for sliding-window rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.exempt_paths.contains(request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = CallerIdentity {
        ip: client_ip(request.headers(), peer),
        user_id: state.user_id(request.headers()),
    };

    let global = state.limiter.check_global(&identity.ip).await;
    if !global.allowed {
        tracing::warn!(client = %identity.ip, "Rate limit exceeded");
        metrics::record_rate_limited("global");
        return rejection(&global, "Rate limit exceeded");
    }

    if let Some(user_id) = identity.user_id.as_deref() {
        let per_user = state.limiter.check_user(user_id).await;
        if !per_user.allowed {
            tracing::warn!(client = %identity.ip, user = %user_id, "User rate limit exceeded");
            metrics::record_rate_limited("user");
            return rejection(&per_user, "User rate limit exceeded");
        }
    }

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;
    if let Some(quota) = global.quota {
        apply_quota_headers(response.headers_mut(), &quota);
    }
    response
}

/// Write the `X-RateLimit-*` headers for `quota`.
pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &QuotaSnapshot) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_at));
}

fn rejection(decision: &RateLimitDecision, detail: &str) -> Response {
    let mut response =
        (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "detail": detail }))).into_response();
    if let Some(quota) = decision.quota {
        apply_quota_headers(response.headers_mut(), &quota);
    }
    if let Some(secs) = decision.retry_after_at(Utc::now().timestamp()) {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}
