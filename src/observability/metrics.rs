//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, service health, breakers)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-service and aggregate metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by service, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_service_health` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy/unknown
//! - `gateway_circuit_opened_total` (counter): breaker trips by service
//! - `gateway_rate_limited_total` (counter): rejections by scope
//! - `gateway_rate_limiter_errors_total` (counter): store failures (failed open)
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::state::ServiceStatus;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_service_health(service: &str, status: ServiceStatus) {
    metrics::gauge!("gateway_service_health", "service" => service.to_string()).set(status.gauge());
}

pub fn record_circuit_opened(service: &str) {
    metrics::counter!("gateway_circuit_opened_total", "service" => service.to_string()).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_rate_limiter_error() {
    metrics::counter!("gateway_rate_limiter_errors_total").increment(1);
}
