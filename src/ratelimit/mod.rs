//! Distributed rate limiting.
//!
//! # Data Flow
//! ```text
//! Request (client IP, optional user ID)
//!     → limiter.rs (global window, then per-user window)
//!     → store.rs (Redis or in-memory sorted set)
//!     → RateLimitDecision { allowed, quota }
//! ```
//!
//! # Design Decisions
//! - Sliding window over timestamped entries, not fixed buckets
//! - Fail open: a broken store never blocks traffic

pub mod limiter;
pub mod store;

pub use limiter::{QuotaSnapshot, RateLimitDecision, RateLimiter};
pub use store::{MemoryStore, RedisStore, StoreError, WindowStore};
