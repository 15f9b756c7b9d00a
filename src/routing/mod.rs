//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (segment-aligned prefix match, optional rewrite)
//!     → Return: RouteMatch { service, target_path } or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile prefix matchers
//!     → Sort by prefix length
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{RouteMatch, Router};
