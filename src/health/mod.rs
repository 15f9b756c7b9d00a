//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every instance of every service concurrently
//!     → Tally healthy/total per service
//!     → state.rs (derive status) → registry (record success/failure)
//!
//! Passive signal:
//!     Proxy outcome → registry record_success / record_failure
//! ```
//!
//! # Design Decisions
//! - Probes are best effort: one failed probe never aborts the cycle
//! - Status is per service, derived from the whole instance tally
//! - The probe and proxy paths share one pooled client

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::ServiceStatus;
