//! Service endpoint set.
//!
//! # Responsibilities
//! - Represent one logical service and its ordered instances
//! - Rotate through instances round-robin
//! - Track health status, latency and failure counters
//! - Own the service's circuit breaker

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::state::ServiceStatus;
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, FailureOutcome};

/// Error raised when a service is built without instances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("service `{0}` must have at least one instance")]
pub struct NoInstances(pub String);

/// One instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// Base URL requests are forwarded to.
    pub request_url: String,
    /// URL probed by the health monitor.
    pub health_url: String,
}

impl Instance {
    pub fn new(request_url: impl Into<String>, health_url: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            health_url: health_url.into(),
        }
    }
}

/// Point-in-time view of a service, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub status: ServiceStatus,
    pub urls: Vec<String>,
    pub health_urls: Vec<String>,
    pub current_url_index: usize,
    pub last_check: Option<DateTime<Utc>>,
    /// Seconds, as a float.
    pub response_time: Option<f64>,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
    pub circuit_open_until: Option<DateTime<Utc>>,
}

/// A logical backend service with its instances, health and breaker state.
#[derive(Debug, Clone)]
pub struct ServiceEndpointSet {
    name: String,
    instances: Vec<Instance>,
    cursor: usize,
    status: ServiceStatus,
    last_checked_at: Option<DateTime<Utc>>,
    last_response_time: Option<Duration>,
    /// Decaying counter, informational only.
    error_count: u64,
    breaker: CircuitBreaker,
}

impl ServiceEndpointSet {
    /// Create a new endpoint set. `instances` must not be empty.
    pub fn new(name: impl Into<String>, instances: Vec<Instance>) -> Result<Self, NoInstances> {
        let name = name.into();
        if instances.is_empty() {
            return Err(NoInstances(name));
        }
        Ok(Self {
            name,
            instances,
            cursor: 0,
            status: ServiceStatus::Unknown,
            last_checked_at: None,
            last_response_time: None,
            error_count: 0,
            breaker: CircuitBreaker::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn last_response_time(&self) -> Option<Duration> {
        self.last_response_time
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.consecutive_failures()
    }

    pub fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn circuit_open_until(&self) -> Option<DateTime<Utc>> {
        self.breaker.open_until()
    }

    /// Whether the service may receive traffic right now.
    pub fn is_available(&mut self) -> bool {
        self.is_available_at(Utc::now())
    }

    /// Availability at `now`. An open circuit past its deadline closes here.
    pub fn is_available_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.breaker.is_open() {
            let passed = self.breaker.try_pass(now);
            if passed {
                tracing::info!(service = %self.name, "Circuit breaker closed after cool-down");
            }
            return passed;
        }
        self.status.is_routable()
    }

    /// Return the instance under the cursor and advance it.
    pub fn next_instance(&mut self) -> &Instance {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.instances.len();
        &self.instances[index]
    }

    /// Record a successful probe cycle or proxied call.
    pub fn record_success(&mut self, response_time: Duration) {
        self.last_response_time = Some(response_time);
        self.error_count = self.error_count.saturating_sub(1);
        if self.breaker.on_success() {
            tracing::info!(service = %self.name, "Circuit breaker closed after successful request");
        }
    }

    /// Record a failed probe cycle or proxied call.
    pub fn record_failure(&mut self, threshold: u32, open_duration: Duration) -> FailureOutcome {
        self.record_failure_at(Utc::now(), threshold, open_duration)
    }

    /// Record a failure observed at `now`.
    pub fn record_failure_at(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        open_duration: Duration,
    ) -> FailureOutcome {
        self.error_count = self.error_count.saturating_add(1);
        let outcome = self.breaker.on_failure(now, threshold, open_duration);
        if outcome == FailureOutcome::Opened {
            tracing::warn!(
                service = %self.name,
                consecutive_failures = self.breaker.consecutive_failures(),
                open_secs = open_duration.as_secs(),
                "Circuit breaker opened"
            );
            metrics::record_circuit_opened(&self.name);
        }
        outcome
    }

    /// Apply the result of one probe cycle and return the previous status.
    ///
    /// `latency` is the latency of the last successful instance probe.
    pub fn apply_probe_cycle(
        &mut self,
        healthy: usize,
        latency: Option<Duration>,
        now: DateTime<Utc>,
        threshold: u32,
        open_duration: Duration,
    ) -> ServiceStatus {
        let previous = self.status;
        self.status = ServiceStatus::from_probe_tally(healthy, self.instances.len());
        self.last_checked_at = Some(now);

        if healthy > 0 {
            self.record_success(latency.unwrap_or_default());
        } else {
            self.record_failure_at(now, threshold, open_duration);
        }
        previous
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            name: self.name.clone(),
            status: self.status,
            urls: self.instances.iter().map(|i| i.request_url.clone()).collect(),
            health_urls: self.instances.iter().map(|i| i.health_url.clone()).collect(),
            current_url_index: self.cursor,
            last_check: self.last_checked_at,
            response_time: self.last_response_time.map(|d| d.as_secs_f64()),
            error_count: self.error_count,
            consecutive_failures: self.breaker.consecutive_failures(),
            circuit_open: self.breaker.is_open(),
            circuit_open_until: self.breaker.open_until(),
        }
    }
}
