//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied call or health probe outcome:
//!     → registry records success/failure on the service
//!     → circuit_breaker.rs (track failure streak, open circuit at threshold)
//!     → selection consults the breaker before routing
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries inside a request: one inbound request, one upstream attempt
//! - Circuit breaker removes persistently failing services from rotation

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, FailureOutcome};
