//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services and their instances.
    pub services: Vec<ServiceConfig>,

    /// Route definitions mapping path prefixes to services.
    pub routes: Vec<RouteConfig>,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Per-service circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A logical backend service with one or more instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name (e.g., "user-service").
    pub name: String,

    /// Instances in round-robin order.
    pub instances: Vec<InstanceConfig>,
}

/// A single instance of a backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    /// Base URL requests are forwarded to (e.g., "http://10.0.0.5:8001").
    pub url: String,

    /// Health probe URL. Defaults to `<url>/health`.
    #[serde(default)]
    pub health_url: Option<String>,
}

impl InstanceConfig {
    /// Health probe URL, falling back to `<url>/health`.
    pub fn resolved_health_url(&self) -> String {
        match &self.health_url {
            Some(url) => url.clone(),
            None => format!("{}/health", self.url.trim_end_matches('/')),
        }
    }
}

/// Route configuration mapping a path prefix to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix to match (segment aligned).
    pub path_prefix: String,

    /// Service name to forward to.
    pub service: String,

    /// Replacement for the matched prefix on the upstream path.
    /// When unset the inbound path is forwarded verbatim.
    #[serde(default)]
    pub upstream_prefix: Option<String>,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Services that must be healthy for the readiness endpoint.
    pub critical_services: Vec<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            critical_services: Vec::new(),
        }
    }
}

/// Circuit breaker configuration, applied to every service.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// How long the circuit stays open before it may auto-close, in seconds.
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_secs: 60,
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Proxied request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Which store backs the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Redis,
    Memory,
}

/// Request quota for one scope.
///
/// Fields missing from a table fall back to the global defaults.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Requests allowed per window.
    pub requests: u64,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When disabled every check is allowed.
    pub enabled: bool,

    /// Store backend.
    pub backend: RateLimitBackend,

    /// Redis connection URL (used by the redis backend).
    pub redis_url: String,

    /// Deadline for one window check against the store, in milliseconds.
    pub store_timeout_ms: u64,

    /// Per client IP quota.
    pub global: QuotaConfig,

    /// Per authenticated user quota.
    pub per_user: QuotaConfig,

    /// Header carrying the authenticated user id.
    pub user_id_header: String,

    /// Paths never subject to rate limiting.
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            store_timeout_ms: 500,
            global: QuotaConfig::default(),
            per_user: QuotaConfig {
                requests: 1000,
                window_secs: 3600,
            },
            user_id_header: "x-user-id".to_string(),
            exempt_paths: vec![
                "/health".to_string(),
                "/health/detailed".to_string(),
                "/health/ready".to_string(),
                "/health/live".to_string(),
            ],
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
