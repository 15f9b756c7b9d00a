//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health endpoints and the proxy catch-all
//! - Wire up middleware (tracing, body limit, rate limiting)
//! - Bind server to listener
//! - Dispatch requests to the routing table and the service proxy
//! - Run the health monitor for the lifetime of the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::HealthMonitor;
use crate::http::client::{HyperUpstream, UpstreamClient};
use crate::http::health::{self, HealthState};
use crate::http::proxy::ServiceProxy;
use crate::observability::metrics;
use crate::ratelimit::RateLimiter;
use crate::registry::{NoInstances, ServiceRegistry};
use crate::routing::Router as RouteTable;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState};

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub proxy: ServiceProxy,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn UpstreamClient>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self, NoInstances> {
        Self::with_client(config, rate_limiter, Arc::new(HyperUpstream::new()))
    }

    /// Create a server that sends proxied calls and probes through `client`.
    pub fn with_client(
        config: GatewayConfig,
        rate_limiter: Arc<RateLimiter>,
        client: Arc<dyn UpstreamClient>,
    ) -> Result<Self, NoInstances> {
        let registry = Arc::new(ServiceRegistry::from_config(
            &config.services,
            config.circuit_breaker,
        )?);

        let state = AppState {
            routes: Arc::new(RouteTable::from_config(&config.routes)),
            proxy: ServiceProxy::new(
                registry.clone(),
                client.clone(),
                Duration::from_secs(config.timeouts.request_secs),
            ),
        };
        let health_state = HealthState {
            registry: registry.clone(),
            limiter: rate_limiter.clone(),
            critical_services: Arc::new(config.health_check.critical_services.clone()),
            started_at: Instant::now(),
        };
        let rate_limit_state = RateLimitState::new(rate_limiter, &config.rate_limit);

        let router = Self::build_router(&config, state, health_state, rate_limit_state);
        Ok(Self {
            router,
            config,
            registry,
            client,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        health_state: HealthState,
        rate_limit_state: RateLimitState,
    ) -> Router {
        let proxy = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        health::routes(health_state)
            .merge(proxy)
            .layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then stop the health monitor.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.registry.service_names().len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(
            self.registry.clone(),
            self.client.clone(),
            self.config.health_check.clone(),
        );
        let monitor_handle = tokio::spawn(monitor.run(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = monitor_handle.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

/// Main proxy handler.
/// Looks up the route, then forwards through the service proxy.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let Some(route) = state.routes.match_path(&path) else {
        tracing::debug!(method = %method, path = %path, "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return GatewayError::RouteNotFound(path).into_response();
    };

    tracing::debug!(
        method = %method,
        path = %path,
        route = %route.route,
        service = %route.service,
        "Proxying request"
    );

    match state
        .proxy
        .forward(request, route.service, &route.target_path)
        .await
    {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), route.service, start_time);
            response
        }
        Err(e) => {
            if e.is_routing() {
                tracing::warn!(service = %route.service, path = %path, reason = %e, "Request not routable");
            }
            metrics::record_request(&method, e.status_code().as_u16(), route.service, start_time);
            e.into_response()
        }
    }
}
