//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP window, then per-user window)
//!     → headers.rs (resolve client IP, strip hop-by-hop)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Forwarding headers set by the edge are trusted for client IP
//! - Rate limiting fails open when its store is down

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimitState};
