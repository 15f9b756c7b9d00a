//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service name identified
//!     → pool.rs (look up the service's endpoint set)
//!     → endpoint.rs (breaker + status check, round-robin cursor)
//!     → Return instance URL or SelectError
//!
//! Outcomes (proxy calls, probe cycles)
//!     → pool.rs (record_success / record_failure / apply_probe_cycle)
//!     → endpoint.rs (counters, status, circuit breaker)
//! ```
//!
//! # Design Decisions
//! - One lock per service: selection, proxy outcomes and probe cycles for a
//!   service serialize, different services never contend
//! - Plain round robin over all instances; per-instance health is not tracked,
//!   the service as a whole is healthy, degraded or unhealthy
//! - Catalog keys are fixed at startup

pub mod endpoint;
pub mod pool;

pub use endpoint::{Instance, NoInstances, ServiceEndpointSet, ServiceSnapshot};
pub use pool::{SelectError, ServiceRegistry};
