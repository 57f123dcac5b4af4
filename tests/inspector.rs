//! Inspector HTTP surface tests.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::Request;
use hz::inspector::{api, ExchangeRecord, Inspector};
use tokio::net::TcpListener;

async fn serve_inspector(inspector: Inspector) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = api::router(inspector);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn capture(inspector: &Inspector, path: &str, status: u16) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .header("host", "proxy.local")
        .body(())
        .unwrap();
    let record = ExchangeRecord::begin(&req, "127.0.0.1:9999".parse().unwrap());
    inspector.capture(record.finish(
        None,
        axum::http::StatusCode::from_u16(status).unwrap(),
        Duration::from_millis(3),
        None,
    ));
}

#[tokio::test]
async fn test_requests_listing_and_detail() {
    let inspector = Inspector::with_capacity(0, 10);
    capture(&inspector, "/first", 200);
    capture(&inspector, "/second", 404);

    let addr = serve_inspector(inspector).await;
    let client = common::test_client();

    let listed: serde_json::Value = client
        .get(format!("http://{addr}/api/requests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["path"], "/second", "newest first");
    assert_eq!(listed[0]["status_code"], 404);
    assert_eq!(listed[1]["id"], "req_1");

    let detail = client
        .get(format!("http://{addr}/api/request/req_1"))
        .send()
        .await
        .unwrap();
    assert_eq!(detail.status(), 200);
    let detail: serde_json::Value = detail.json().await.unwrap();
    assert_eq!(detail["path"], "/first");
    assert_eq!(detail["host"], "proxy.local");

    let missing = client
        .get(format!("http://{addr}/api/request/req_42"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_clear_empties_ring() {
    let inspector = Inspector::with_capacity(0, 10);
    capture(&inspector, "/a", 200);

    let addr = serve_inspector(inspector.clone()).await;
    let client = common::test_client();

    let cleared = client
        .post(format!("http://{addr}/api/requests/clear"))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), 200);
    assert!(inspector.snapshot().is_empty());

    // Clearing is POST-only.
    let wrong_method = client
        .get(format!("http://{addr}/api/requests/clear"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status(), 405);
}

#[tokio::test]
async fn test_sse_streams_snapshot_then_live() {
    let inspector = Inspector::with_capacity(0, 10);
    capture(&inspector, "/before", 200);

    let addr = serve_inspector(inspector.clone()).await;
    let client = common::test_client();

    let mut response = client
        .get(format!("http://{addr}/api/requests/sse"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let first = response.chunk().await.unwrap().unwrap();
    let first = String::from_utf8_lossy(&first);
    assert!(first.contains("data:"), "chunk: {first}");
    assert!(first.contains("/before"), "chunk: {first}");

    capture(&inspector, "/after", 200);
    let second = response.chunk().await.unwrap().unwrap();
    let second = String::from_utf8_lossy(&second);
    assert!(second.contains("/after"), "chunk: {second}");
}

#[tokio::test]
async fn test_ui_is_bundled() {
    let inspector = Inspector::with_capacity(0, 10);
    let addr = serve_inspector(inspector).await;
    let client = common::test_client();

    for path in ["/", "/inspect/http"] {
        let response = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("hz inspector"));
        assert!(!body.contains("https://cdn."), "UI must not load CDN assets");
    }
}
