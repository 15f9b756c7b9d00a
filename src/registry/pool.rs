//! Service registry.
//!
//! # Responsibilities
//! - Own the catalog of services, keyed by name, fixed at startup
//! - Select an instance for a service (round-robin, breaker aware)
//! - Apply success/failure outcomes from the proxy and health monitor

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::{CircuitBreakerConfig, ServiceConfig};
use crate::health::state::ServiceStatus;
use crate::registry::endpoint::{Instance, NoInstances, ServiceEndpointSet, ServiceSnapshot};
use crate::resilience::FailureOutcome;

/// Why an instance could not be selected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("service `{0}` is not registered")]
    ServiceNotFound(String),
    #[error("service `{service}` is not available")]
    Unavailable {
        service: String,
        /// Whether the breaker was open at selection time.
        circuit_open: bool,
    },
}

/// Catalog of backend services with per-service locking.
#[derive(Debug)]
pub struct ServiceRegistry {
    services: HashMap<String, Mutex<ServiceEndpointSet>>,
    breaker: CircuitBreakerConfig,
}

impl ServiceRegistry {
    /// Create a registry from prepared endpoint sets.
    pub fn new(services: Vec<ServiceEndpointSet>, breaker: CircuitBreakerConfig) -> Self {
        let services = services
            .into_iter()
            .map(|s| (s.name().to_string(), Mutex::new(s)))
            .collect();
        Self { services, breaker }
    }

    /// Create a registry from configuration.
    pub fn from_config(
        configs: &[ServiceConfig],
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, NoInstances> {
        let mut services = Vec::with_capacity(configs.len());
        for config in configs {
            let instances = config
                .instances
                .iter()
                .map(|i| Instance::new(i.url.trim_end_matches('/'), i.resolved_health_url()))
                .collect();
            services.push(ServiceEndpointSet::new(config.name.clone(), instances)?);
        }

        tracing::info!(count = services.len(), "Registered services");
        Ok(Self::new(services, breaker))
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.breaker
    }

    fn open_duration(&self) -> Duration {
        Duration::from_secs(self.breaker.open_duration_secs)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select the next instance URL for `name`.
    pub fn select_instance(&self, name: &str) -> Result<String, SelectError> {
        self.select_instance_at(name, Utc::now())
    }

    /// Select at an explicit time.
    pub fn select_instance_at(&self, name: &str, now: DateTime<Utc>) -> Result<String, SelectError> {
        let service = self
            .services
            .get(name)
            .ok_or_else(|| SelectError::ServiceNotFound(name.to_string()))?;

        let mut service = service.lock();
        if !service.is_available_at(now) {
            return Err(SelectError::Unavailable {
                service: name.to_string(),
                circuit_open: service.circuit_open(),
            });
        }
        Ok(service.next_instance().request_url.clone())
    }

    /// Record a successful call. Unknown services are ignored.
    pub fn record_success(&self, name: &str, elapsed: Duration) {
        if let Some(service) = self.services.get(name) {
            service.lock().record_success(elapsed);
        }
    }

    /// Record a failed call using the configured breaker settings.
    pub fn record_failure(&self, name: &str) -> Option<FailureOutcome> {
        let open_duration = self.open_duration();
        self.services.get(name).map(|service| {
            service
                .lock()
                .record_failure(self.breaker.failure_threshold, open_duration)
        })
    }

    /// Apply one probe cycle's tally to `name`. Returns (previous, current) status.
    pub fn apply_probe_cycle(
        &self,
        name: &str,
        healthy: usize,
        latency: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Option<(ServiceStatus, ServiceStatus)> {
        let open_duration = self.open_duration();
        self.services.get(name).map(|service| {
            let mut service = service.lock();
            let previous = service.apply_probe_cycle(
                healthy,
                latency,
                now,
                self.breaker.failure_threshold,
                open_duration,
            );
            (previous, service.status())
        })
    }

    /// Health URLs per service, in instance order.
    pub fn probe_targets(&self) -> Vec<(String, Vec<String>)> {
        self.services
            .iter()
            .map(|(name, service)| {
                let urls = service
                    .lock()
                    .instances()
                    .iter()
                    .map(|i| i.health_url.clone())
                    .collect();
                (name.clone(), urls)
            })
            .collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<ServiceSnapshot> {
        self.services.get(name).map(|s| s.lock().snapshot())
    }

    /// Snapshot of every service, ordered by name.
    pub fn status_report(&self) -> BTreeMap<String, ServiceSnapshot> {
        self.services
            .iter()
            .map(|(name, service)| (name.clone(), service.lock().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;

    fn registry(threshold: u32) -> ServiceRegistry {
        let configs = vec![
            ServiceConfig {
                name: "user-service".into(),
                instances: vec![
                    InstanceConfig {
                        url: "http://127.0.0.1:8001/".into(),
                        health_url: None,
                    },
                    InstanceConfig {
                        url: "http://127.0.0.1:8002".into(),
                        health_url: None,
                    },
                ],
            },
            ServiceConfig {
                name: "order-service".into(),
                instances: vec![InstanceConfig {
                    url: "http://127.0.0.1:8003".into(),
                    health_url: Some("http://127.0.0.1:8003/ping".into()),
                }],
            },
        ];
        ServiceRegistry::from_config(
            &configs,
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_duration_secs: 60,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_select_round_robin() {
        let reg = registry(5);
        assert_eq!(reg.select_instance("user-service").unwrap(), "http://127.0.0.1:8001");
        assert_eq!(reg.select_instance("user-service").unwrap(), "http://127.0.0.1:8002");
        assert_eq!(reg.select_instance("user-service").unwrap(), "http://127.0.0.1:8001");
    }

    #[test]
    fn test_select_unknown_service() {
        let reg = registry(5);
        assert_eq!(
            reg.select_instance("nope"),
            Err(SelectError::ServiceNotFound("nope".into()))
        );
    }

    #[test]
    fn test_select_reports_open_circuit() {
        let reg = registry(2);
        reg.record_failure("order-service");
        assert!(reg.select_instance("order-service").is_ok());

        assert_eq!(reg.record_failure("order-service"), Some(FailureOutcome::Opened));
        assert_eq!(
            reg.select_instance("order-service"),
            Err(SelectError::Unavailable {
                service: "order-service".into(),
                circuit_open: true,
            })
        );

        // Other services are unaffected.
        assert!(reg.select_instance("user-service").is_ok());
    }

    #[test]
    fn test_select_unhealthy_without_circuit() {
        let reg = registry(5);
        let now = Utc::now();
        let (previous, current) = reg.apply_probe_cycle("order-service", 0, None, now).unwrap();
        assert_eq!(previous, ServiceStatus::Unknown);
        assert_eq!(current, ServiceStatus::Unhealthy);

        assert_eq!(
            reg.select_instance_at("order-service", now),
            Err(SelectError::Unavailable {
                service: "order-service".into(),
                circuit_open: false,
            })
        );
    }

    #[test]
    fn test_unknown_service_outcomes_ignored() {
        let reg = registry(1);
        reg.record_success("missing", Duration::from_millis(1));
        assert_eq!(reg.record_failure("missing"), None);
    }

    #[test]
    fn test_probe_targets_and_report() {
        let reg = registry(5);
        let mut targets = reg.probe_targets();
        targets.sort();
        assert_eq!(
            targets,
            vec![
                ("order-service".to_string(), vec!["http://127.0.0.1:8003/ping".to_string()]),
                (
                    "user-service".to_string(),
                    vec![
                        "http://127.0.0.1:8001/health".to_string(),
                        "http://127.0.0.1:8002/health".to_string(),
                    ]
                ),
            ]
        );

        let report = reg.status_report();
        assert_eq!(report.keys().cloned().collect::<Vec<_>>(), reg.service_names());
        assert_eq!(report["user-service"].status, ServiceStatus::Unknown);
    }
}
