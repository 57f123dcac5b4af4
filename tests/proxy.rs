//! End-to-end routing and forwarding tests.

mod common;

use std::sync::atomic::Ordering;

use hz::config::{RewriteConfig, RouteConfig};
use tokio::net::TcpListener;

fn header_rule(rule: &str) -> RouteConfig {
    RouteConfig {
        header: Some(rule.to_string()),
        ..Default::default()
    }
}

fn path_rule(path: &str) -> RouteConfig {
    RouteConfig {
        path: Some(path.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_header_routing() {
    let sabry_addr = common::start_echo_backend("sabry").await;
    let ahmed_addr = common::start_echo_backend("ahmed").await;
    let default_addr = common::start_echo_backend("default").await;

    let mut sabry = common::service("sabry", sabry_addr);
    sabry.routes = vec![header_rule("b-service=sabry")];
    let mut ahmed = common::service("ahmed", ahmed_addr);
    ahmed.routes = vec![header_rule("b-service=ahmed")];
    let mut fallback = common::service("default", default_addr);
    fallback.default = true;

    let proxy = common::start_proxy(common::config_with(vec![sabry, ahmed, fallback])).await;
    let client = common::test_client();

    let body = client
        .get(proxy.url("/x"))
        .header("b-service", "sabry")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "sabry:/x");

    let body = client
        .get(proxy.url("/x"))
        .header("b-service", "ahmed")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ahmed:/x");

    let body = client
        .get(proxy.url("/x"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "default:/x");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_path_routing_with_strip_prefix() {
    let api_addr = common::start_echo_backend("api").await;

    let mut api = common::service("api", api_addr);
    api.default = true;
    api.routes = vec![path_rule("/api/*")];
    api.rewrite = Some(RewriteConfig {
        strip_prefix: Some("/api".to_string()),
        ..Default::default()
    });

    let proxy = common::start_proxy(common::config_with(vec![api])).await;
    let client = common::test_client();

    let body = client
        .get(proxy.url("/api/users/42"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "api:/users/42");

    let body = client
        .get(proxy.url("/api"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "api:/");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_priority_tiebreak_by_pattern_length() {
    let a_addr = common::start_echo_backend("a").await;
    let b_addr = common::start_echo_backend("b").await;

    let mut a = common::service("a", a_addr);
    a.routes = vec![path_rule("/api/users/*")];
    let mut b = common::service("b", b_addr);
    b.routes = vec![path_rule("/api/*")];
    b.default = true;

    let proxy = common::start_proxy(common::config_with(vec![a, b])).await;
    let client = common::test_client();

    let body = client
        .get(proxy.url("/api/users/1"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "a:/api/users/1");

    let body = client
        .get(proxy.url("/api/orders"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "b:/api/orders");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_forwarded_headers() {
    let raw_addr = common::start_raw_echo_backend().await;

    let mut svc = common::service("raw", raw_addr);
    svc.default = true;
    svc.headers
        .insert("x-injected".to_string(), "from-config".to_string());

    let proxy = common::start_proxy(common::config_with(vec![svc])).await;
    let client = common::test_client();

    let head = client
        .get(proxy.url("/check"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
        .to_lowercase();

    assert!(head.contains(&format!("host: {raw_addr}")), "head: {head}");
    assert!(head.contains("x-forwarded-proto: http"), "head: {head}");
    assert!(head.contains("x-forwarded-for: 127.0.0.1"), "head: {head}");
    assert!(
        head.contains(&format!("x-forwarded-host: {}", proxy.addr)),
        "head: {head}"
    );
    assert!(head.contains("x-injected: from-config"), "head: {head}");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_no_route_returns_502() {
    let api_addr = common::start_echo_backend("api").await;

    // No default service here, so unmatched paths have nowhere to go.
    let mut api = common::service("api", api_addr);
    api.routes = vec![path_rule("/api/*")];

    let proxy = common::start_proxy(common::config_with(vec![api])).await;
    let client = common::test_client();

    let response = client.get(proxy.url("/elsewhere")).send().await.unwrap();
    assert_eq!(response.status(), 502);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_returns_502() {
    // Grab a port and release it so the dial is refused.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let mut svc = common::service("dead", dead_addr);
    svc.default = true;

    let proxy = common::start_proxy(common::config_with(vec![svc])).await;
    let client = common::test_client();

    let response = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(proxy.stats.total_errors.load(Ordering::Relaxed), 1);
    assert_eq!(
        proxy.registry.get("dead").unwrap().stats.errors(),
        1,
        "backend error counter"
    );

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_health_endpoint() {
    let a_addr = common::start_echo_backend("a").await;
    let mut a = common::service("a", a_addr);
    a.default = true;

    let proxy = common::start_proxy(common::config_with(vec![a])).await;
    let client = common::test_client();

    let response = client.get(proxy.url("/__hz/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_total_requests_equals_service_counts_plus_rejections() {
    let a_addr = common::start_echo_backend("a").await;
    let mut a = common::service("a", a_addr);
    a.routes = vec![path_rule("/a/*")];

    let proxy = common::start_proxy(common::config_with(vec![a])).await;
    let client = common::test_client();

    for _ in 0..3 {
        client.get(proxy.url("/a/x")).send().await.unwrap();
    }
    // Two dispatcher-level rejections.
    for _ in 0..2 {
        assert_eq!(
            client.get(proxy.url("/nope")).send().await.unwrap().status(),
            502
        );
    }

    let service_requests = proxy.registry.get("a").unwrap().stats.requests();
    assert_eq!(service_requests, 3);
    assert_eq!(
        proxy.stats.total_requests.load(Ordering::Relaxed),
        service_requests + 2
    );

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_query_string_preserved() {
    let api_addr = common::start_echo_backend("api").await;
    let mut api = common::service("api", api_addr);
    api.default = true;

    let proxy = common::start_proxy(common::config_with(vec![api])).await;
    let client = common::test_client();

    let body = client
        .get(proxy.url("/search?q=hello&page=2"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "api:/search?q=hello&page=2");

    proxy.shutdown.trigger();
}
