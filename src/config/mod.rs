//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the service catalog is fixed at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    CircuitBreakerConfig, GatewayConfig, HealthCheckConfig, InstanceConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, QuotaConfig, RateLimitBackend, RateLimitConfig, RouteConfig,
    SecurityConfig, ServiceConfig, TimeoutConfig,
};
