//! Service health state.
//!
//! # States
//! - Unknown: no probe cycle has completed yet
//! - Healthy: every instance answered its probe
//! - Degraded: some, but not all, instances answered
//! - Unhealthy: no instance answered
//!
//! # Design Decisions
//! - Status is recomputed from scratch every probe cycle (no hysteresis)
//! - Only Unhealthy removes a service from routing; Degraded and Unknown stay
//!   routable between cycles

use serde::Serialize;

/// Health status of a logical service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl ServiceStatus {
    /// Derive status from one probe cycle's tally.
    pub fn from_probe_tally(healthy: usize, total: usize) -> Self {
        if healthy == 0 {
            ServiceStatus::Unhealthy
        } else if healthy >= total {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Degraded
        }
    }

    /// Whether a service in this status may receive traffic.
    pub fn is_routable(self) -> bool {
        !matches!(self, ServiceStatus::Unhealthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Unknown => "unknown",
        }
    }

    /// Gauge value exported for this status.
    pub fn gauge(self) -> f64 {
        match self {
            ServiceStatus::Healthy => 1.0,
            ServiceStatus::Degraded => 0.5,
            ServiceStatus::Unhealthy | ServiceStatus::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
