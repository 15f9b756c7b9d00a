//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → security::rate_limit (admission, caller identity)
//!     → health.rs (gateway health endpoints) or routing table
//!     → proxy.rs (select instance, forward once, record outcome)
//!         → request.rs (correlation ID, upstream URI)
//!         → client.rs (pooled upstream client with deadline)
//!         → response.rs (strip hop-by-hop, gateway headers)
//!     → Send to client
//! ```

pub mod client;
pub mod health;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use client::{HyperUpstream, TransportError, TransportErrorKind, UpstreamClient};
pub use proxy::ServiceProxy;
pub use server::HttpServer;
