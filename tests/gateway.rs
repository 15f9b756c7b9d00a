//! End-to-end tests: the gateway on a real socket in front of mock backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use api_gateway::config::RateLimitBackend;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_round_robin_across_instances() {
    let a = common::start_mock_backend("instance-a").await;
    let b = common::start_mock_backend("instance-b").await;

    let mut config = common::base_config();
    config.services.push(common::service("user-service", &[a, b]));
    config.routes.push(common::route("/api/v1/users", "user-service"));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let mut bodies = Vec::new();
    for _ in 0..4 {
        let res = client.get(gateway.url("/api/v1/users/1")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-gateway-service"], "user-service");
        assert!(res.headers().contains_key("x-response-time"));
        assert!(res.headers().contains_key("x-correlation-id"));
        bodies.push(res.text().await.unwrap());
    }
    assert_eq!(bodies, ["instance-a", "instance-b", "instance-a", "instance-b"]);

    gateway.stop().await;
}

#[tokio::test]
async fn test_path_and_query_forwarded_verbatim() {
    let backend = common::start_programmable_backend(|path| async move { (200, path) }).await;

    let mut config = common::base_config();
    config.services.push(common::service("order-service", &[backend]));
    config.routes.push(common::route("/api/v1/orders", "order-service"));
    let gateway = common::start_gateway(config).await;

    let res = common::client()
        .get(gateway.url("/api/v1/orders/42?status=open&page=2"))
        .header("x-correlation-id", "trace-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-correlation-id"], "trace-123");
    assert_eq!(res.text().await.unwrap(), "/api/v1/orders/42?status=open&page=2");

    gateway.stop().await;
}

#[tokio::test]
async fn test_upstream_error_status_passes_through() {
    let backend = common::start_programmable_backend(|_| async { (500, "boom".to_string()) }).await;

    let mut config = common::base_config();
    config.services.push(common::service("user-service", &[backend]));
    config.routes.push(common::route("/users", "user-service"));
    let gateway = common::start_gateway(config).await;

    let res = common::client().get(gateway.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "boom");

    gateway.stop().await;
}

#[tokio::test]
async fn test_dead_instance_trips_circuit() {
    let dead = common::dead_addr().await;

    let mut config = common::base_config();
    config.circuit_breaker.failure_threshold = 2;
    config.services.push(common::service("payment-service", &[dead]));
    config.routes.push(common::route("/api/v1/payments", "payment-service"));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client.get(gateway.url("/api/v1/payments")).send().await.unwrap();
        assert_eq!(res.status(), 502);
    }

    let res = client.get(gateway.url("/api/v1/payments")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("circuit breaker open"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_stalled_upstream_body_is_bounded() {
    let backend = common::start_stalling_backend().await;

    let mut config = common::base_config();
    config.timeouts.request_secs = 1;
    config.circuit_breaker.failure_threshold = 1;
    config.services.push(common::service("report-service", &[backend]));
    config.routes.push(common::route("/reports", "report-service"));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let started = Instant::now();
    let res = client.get(gateway.url("/reports")).send().await.unwrap();
    assert_eq!(res.status(), 504);
    assert!(started.elapsed() < Duration::from_secs(5));

    // The stall counted as a failure and opened the circuit.
    let res = client.get(gateway.url("/reports")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let gateway = common::start_gateway(common::base_config()).await;

    let res = common::client().get(gateway.url("/nothing/here")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    gateway.stop().await;
}

#[tokio::test]
async fn test_rate_limit_rejects_with_headers() {
    let backend = common::start_mock_backend("ok").await;

    let mut config = common::base_config();
    config.rate_limit.enabled = true;
    config.rate_limit.backend = RateLimitBackend::Memory;
    config.rate_limit.global.requests = 2;
    config.services.push(common::service("user-service", &[backend]));
    config.routes.push(common::route("/api", "user-service"));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for remaining in ["1", "0"] {
        let res = client
            .get(gateway.url("/api/x"))
            .header("x-forwarded-for", "198.51.100.1")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-ratelimit-remaining"], remaining);
    }

    let res = client
        .get(gateway.url("/api/x"))
        .header("x-forwarded-for", "198.51.100.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["x-ratelimit-limit"], "2");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    assert!(res.headers().contains_key("x-ratelimit-reset"));
    assert!(res.headers().contains_key("retry-after"));

    // Health endpoints are exempt.
    let res = client
        .get(gateway.url("/health/live"))
        .header("x-forwarded-for", "198.51.100.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    gateway.stop().await;
}

#[tokio::test]
async fn test_unreachable_redis_fails_open() {
    let backend = common::start_mock_backend("ok").await;
    let dead = common::dead_addr().await;

    let mut config = common::base_config();
    config.rate_limit.enabled = true;
    config.rate_limit.backend = RateLimitBackend::Redis;
    config.rate_limit.redis_url = format!("redis://{dead}");
    config.rate_limit.global.requests = 1;
    config.services.push(common::service("user-service", &[backend]));
    config.routes.push(common::route("/api", "user-service"));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..3 {
        let res = client.get(gateway.url("/api")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert!(!res.headers().contains_key("x-ratelimit-limit"));
    }

    let body: Value = client
        .get(gateway.url("/health/detailed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["checks"]["rate_limit_store"]["status"], "unhealthy");

    gateway.stop().await;
}

#[tokio::test]
async fn test_health_monitor_drives_readiness() {
    let probes = Arc::new(AtomicU32::new(0));
    let counter = probes.clone();
    let backend = common::start_programmable_backend(move |path| {
        let counter = counter.clone();
        async move {
            if path == "/health" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            (200, "{\"status\":\"healthy\"}".to_string())
        }
    })
    .await;

    let mut config = common::base_config();
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.critical_services = vec!["user-service".to_string()];
    config.services.push(common::service("user-service", &[backend]));
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let mut ready = false;
    for _ in 0..50 {
        let res = client.get(gateway.url("/health/ready")).send().await.unwrap();
        if res.status() == 200 {
            ready = true;
            break;
        }
        assert_eq!(res.status(), 503);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "gateway never became ready");
    assert!(probes.load(Ordering::SeqCst) >= 1);

    let body: Value = client.get(gateway.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(
        body["checks"]["backend_services"]["details"]["services"]["user-service"]["status"],
        "healthy"
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let gateway = common::start_gateway(common::base_config()).await;
    let res = common::client().get(gateway.url("/health/live")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    gateway.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());
}
