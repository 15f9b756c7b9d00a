//! Gateway health endpoints.
//!
//! `/health/live` only proves the process answers. `/health` and
//! `/health/detailed` summarise backend status from the registry without
//! probing. `/health/ready` fails with 503 when no critical service is
//! healthy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::health::ServiceStatus;
use crate::ratelimit::RateLimiter;
use crate::registry::ServiceRegistry;

/// State shared by the health handlers.
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<ServiceRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub critical_services: Arc<Vec<String>>,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CheckResult {
    fn new(status: &'static str, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status,
            message: message.into(),
            details,
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub service: &'static str,
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, CheckResult>,
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    fn new(service: &'static str, started_at: Instant, checks: BTreeMap<&'static str, CheckResult>) -> Self {
        let status = if checks.values().all(CheckResult::is_healthy) {
            "healthy"
        } else {
            "unhealthy"
        };
        Self {
            service,
            status,
            checks,
            uptime_seconds: started_at.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub fn routes(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(basic_health))
        .route("/health/detailed", get(detailed_health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(state)
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

async fn basic_health(State(state): State<HealthState>) -> Json<HealthReport> {
    Json(HealthReport::new("api-gateway", state.started_at, basic_checks(&state)))
}

async fn detailed_health(State(state): State<HealthState>) -> Json<HealthReport> {
    let mut checks = basic_checks(&state);
    let connected = state.limiter.is_connected();

    checks.insert(
        "gateway_components",
        CheckResult::new(
            "healthy",
            "Gateway components operational",
            Some(json!({
                "rate_limiter": if connected { "connected" } else { "disconnected" },
                "middleware": "active",
                "routing": "active",
            })),
        ),
    );
    checks.insert(
        "rate_limit_store",
        if connected {
            CheckResult::new(
                "healthy",
                "Rate limit store connection active",
                Some(json!({ "connection": "active", "component": "rate_limiter" })),
            )
        } else {
            CheckResult::new(
                "unhealthy",
                "Rate limit store connection not available",
                Some(json!({ "connection": "inactive", "component": "rate_limiter" })),
            )
        },
    );

    Json(HealthReport::new("api-gateway-detailed", state.started_at, checks))
}

async fn readiness(State(state): State<HealthState>) -> Response {
    let check = critical_services_check(&state);
    let mut checks = BTreeMap::new();
    checks.insert("critical_services", check);
    let report = HealthReport::new("api-gateway-readiness", state.started_at, checks);

    if report.is_healthy() {
        Json(report).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "detail": report }))).into_response()
    }
}

fn basic_checks(state: &HealthState) -> BTreeMap<&'static str, CheckResult> {
    let mut checks = BTreeMap::new();
    checks.insert(
        "basic",
        CheckResult::new(
            "healthy",
            "API Gateway is running",
            Some(json!({ "version": env!("CARGO_PKG_VERSION") })),
        ),
    );
    checks.insert("backend_services", backend_services_check(&state.registry));
    checks
}

fn backend_services_check(registry: &ServiceRegistry) -> CheckResult {
    let services = registry.status_report();
    if services.is_empty() {
        return CheckResult::new("unhealthy", "No backend services registered", None);
    }

    let total = services.len();
    let unhealthy: Vec<&str> = services
        .iter()
        .filter(|(_, s)| s.status != ServiceStatus::Healthy)
        .map(|(name, _)| name.as_str())
        .collect();
    let healthy = total - unhealthy.len();

    let (status, message) = if healthy == total {
        ("healthy", format!("All {total} backend services are healthy"))
    } else if healthy > 0 {
        ("degraded", format!("{healthy}/{total} backend services healthy"))
    } else {
        ("unhealthy", "No backend services are healthy".to_string())
    };

    CheckResult::new(
        status,
        message,
        Some(json!({
            "total_services": total,
            "healthy_services": healthy,
            "unhealthy_services": unhealthy,
            "services": services,
        })),
    )
}

fn critical_services_check(state: &HealthState) -> CheckResult {
    let critical = state.critical_services.as_slice();
    if critical.is_empty() {
        return CheckResult::new("healthy", "No critical services configured", None);
    }

    let healthy_critical: Vec<&str> = critical
        .iter()
        .filter(|name| {
            state
                .registry
                .snapshot(name)
                .is_some_and(|s| s.status == ServiceStatus::Healthy)
        })
        .map(String::as_str)
        .collect();

    let details = json!({
        "critical_services": critical,
        "healthy_critical": healthy_critical,
    });

    if healthy_critical.is_empty() {
        CheckResult::new("unhealthy", "No critical backend services are healthy", Some(details))
    } else {
        CheckResult::new(
            "healthy",
            format!("{}/{} critical services ready", healthy_critical.len(), critical.len()),
            Some(details),
        )
    }
}
