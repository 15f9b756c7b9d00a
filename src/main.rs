//! API Gateway
//!
//! A resilient API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ rate limit ──▶ routing ──▶ service proxy ──▶ upstream instance
//!                       │                          │    ▲
//!                       ▼                          ▼    │
//!                  window store              service registry ◀── health monitor
//!               (redis | memory)           (round robin, breaker)   (periodic probes)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::loader::load_config;
use api_gateway::observability::{logging, metrics};
use api_gateway::ratelimit::RateLimiter;
use api_gateway::{GatewayConfig, HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "api-gateway", version, about = "Resilient API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let rate_limiter = Arc::new(RateLimiter::connect(&config.rate_limit).await);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, rate_limiter)?;
    let receiver = shutdown.subscribe();
    tokio::spawn(shutdown.trigger_on_signal());

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
