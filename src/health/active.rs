//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every instance of every service
//! - Fold each service's probe tally into the registry

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request};
use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::ServiceStatus;
use crate::http::client::UpstreamClient;
use crate::observability::metrics;
use crate::registry::ServiceRegistry;

/// Outcome of probing one instance.
#[derive(Debug, Clone, Copy)]
struct Probe {
    healthy: bool,
    latency: Duration,
}

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn UpstreamClient>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        client: Arc<dyn UpstreamClient>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            services = self.registry.service_names().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe cycle across all services.
    pub async fn check_all(&self) {
        let targets = self.registry.probe_targets();
        join_all(
            targets
                .into_iter()
                .map(|(service, urls)| self.check_service(service, urls)),
        )
        .await;
    }

    async fn check_service(&self, service: String, urls: Vec<String>) {
        let probes = join_all(urls.iter().map(|url| self.probe(&service, url))).await;

        let healthy = probes.iter().filter(|p| p.healthy).count();
        let latency = probes.iter().rev().find(|p| p.healthy).map(|p| p.latency);

        let Some((previous, current)) =
            self.registry
                .apply_probe_cycle(&service, healthy, latency, Utc::now())
        else {
            return;
        };

        if previous != current {
            if current == ServiceStatus::Healthy {
                tracing::info!(
                    service = %service,
                    from = %previous,
                    to = %current,
                    healthy,
                    total = probes.len(),
                    "Service health changed"
                );
            } else {
                tracing::warn!(
                    service = %service,
                    from = %previous,
                    to = %current,
                    healthy,
                    total = probes.len(),
                    "Service health changed"
                );
            }
        }
        metrics::record_service_health(&service, current);
    }

    async fn probe(&self, service: &str, url: &str) -> Probe {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let request = match Request::builder()
            .method("GET")
            .uri(url)
            .header(header::USER_AGENT, "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(service = %service, url = %url, error = %e, "Failed to build health check request");
                return Probe {
                    healthy: false,
                    latency: Duration::ZERO,
                };
            }
        };

        let start = Instant::now();
        let healthy = match self.client.send(request, timeout).await {
            Ok(response) => {
                let success = response.status().is_success();
                if !success {
                    tracing::debug!(service = %service, url = %url, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Err(e) => {
                tracing::debug!(service = %service, url = %url, error = %e, "Health check failed");
                false
            }
        };

        Probe {
            healthy,
            latency: start.elapsed(),
        }
    }
}
