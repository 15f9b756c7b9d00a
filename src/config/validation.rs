//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes and critical services reference
//!   registered services)
//! - Validate value ranges (timeouts > 0, windows > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("service `{0}` is defined more than once")]
    DuplicateService(String),
    #[error("service `{0}` has no instances")]
    NoInstances(String),
    #[error("service `{service}` has invalid url `{url}`: {reason}")]
    InvalidUrl {
        service: String,
        url: String,
        reason: String,
    },
    #[error("route `{route}` references unknown service `{service}`")]
    UnknownRouteService { route: String, service: String },
    #[error("route `{0}` path_prefix must start with '/'")]
    InvalidPathPrefix(String),
    #[error("critical service `{0}` is not registered")]
    UnknownCriticalService(String),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for service in &config.services {
        if service.name.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceName);
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        if service.instances.is_empty() {
            errors.push(ValidationError::NoInstances(service.name.clone()));
        }

        for instance in &service.instances {
            for url in [instance.url.clone(), instance.resolved_health_url()] {
                if let Err(reason) = check_http_url(&url) {
                    errors.push(ValidationError::InvalidUrl {
                        service: service.name.clone(),
                        url,
                        reason,
                    });
                }
            }
        }
    }

    for route in &config.routes {
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPathPrefix(route.name.clone()));
        }
        if !names.contains(route.service.as_str()) {
            errors.push(ValidationError::UnknownRouteService {
                route: route.name.clone(),
                service: route.service.clone(),
            });
        }
    }

    for critical in &config.health_check.critical_services {
        if !names.contains(critical.as_str()) {
            errors.push(ValidationError::UnknownCriticalService(critical.clone()));
        }
    }

    let ranges: [(&'static str, u64); 9] = [
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("health_check.timeout_secs", config.health_check.timeout_secs),
        (
            "circuit_breaker.failure_threshold",
            u64::from(config.circuit_breaker.failure_threshold),
        ),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("rate_limit.global.requests", config.rate_limit.global.requests),
        ("rate_limit.global.window_secs", config.rate_limit.global.window_secs),
        ("rate_limit.per_user.requests", config.rate_limit.per_user.requests),
        (
            "rate_limit.per_user.window_secs",
            config.rate_limit.per_user.window_secs,
        ),
        ("rate_limit.store_timeout_ms", config.rate_limit.store_timeout_ms),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{InstanceConfig, RouteConfig, ServiceConfig};

    fn service(name: &str, urls: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            instances: urls
                .iter()
                .map(|u| InstanceConfig {
                    url: u.to_string(),
                    health_url: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.services.push(service("users", &[]));
        config.services.push(service("users", &["https://10.0.0.1"]));
        config.routes.push(RouteConfig {
            name: "orders".into(),
            path_prefix: "api/orders".into(),
            service: "orders".into(),
            upstream_prefix: None,
        });
        config.circuit_breaker.failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoInstances("users".into())));
        assert!(errors.contains(&ValidationError::DuplicateService("users".into())));
        assert!(errors.contains(&ValidationError::InvalidPathPrefix("orders".into())));
        assert!(errors.contains(&ValidationError::UnknownRouteService {
            route: "orders".into(),
            service: "orders".into(),
        }));
        assert!(errors.contains(&ValidationError::Zero("circuit_breaker.failure_threshold")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUrl { url, .. } if url == "https://10.0.0.1")));
    }

    #[test]
    fn test_unknown_critical_service() {
        let mut config = GatewayConfig::default();
        config.services.push(service("users", &["http://127.0.0.1:8001"]));
        config.health_check.critical_services = vec!["users".into(), "orders".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::UnknownCriticalService("orders".into())]);
    }
}
