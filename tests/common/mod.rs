//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use hz::config::{Config, Manager, ServiceConfig};
use hz::http::ProxyStats;
use hz::lifecycle::{App, AppOptions, Shutdown};
use hz::registry::Registry;

/// Start a mock backend answering every request with 200 and a body of
/// `name:path`. Returns the bound address.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    start_programmable_backend(move |path| async move { (200, format!("{name}:{path}")) }).await
}

/// Start a mock backend whose status and body come from `f(path)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).into_owned();
                let path = head
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                let (status, body) = f(path).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock backend that echoes the raw request head back as its
/// body, for asserting on forwarded headers.
pub async fn start_raw_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).into_owned();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    head.len(),
                    head
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a WebSocket backend that echoes text and binary frames.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// A proxy instance booted for a test.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Registry,
    pub stats: Arc<ProxyStats>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Boot a proxy from an in-memory config on an ephemeral port.
pub async fn start_proxy(config: Config) -> TestProxy {
    start_proxy_with_manager(
        Manager::from_config(config),
        AppOptions {
            watch: false,
            no_tunnel: true,
            ..Default::default()
        },
    )
    .await
}

/// Boot a proxy from a prepared manager, waiting until the listener
/// answers its self-check.
pub async fn start_proxy_with_manager(manager: Manager, options: AppOptions) -> TestProxy {
    let app = App::new(manager, options).unwrap();
    let registry = app.registry().clone();
    let stats = app.stats();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = app.run(listener, run_shutdown).await;
    });

    let client = test_client();
    for _ in 0..50 {
        if client
            .get(format!("http://{addr}/__hz/health"))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    TestProxy {
        addr,
        shutdown,
        registry,
        stats,
    }
}

/// HTTP client that ignores proxy environment variables.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Service config pointing at a mock backend.
pub fn service(name: &str, addr: SocketAddr) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        target: format!("http://{addr}"),
        ..Default::default()
    }
}

/// Root config wrapping `services` as-is.
pub fn config_with(services: Vec<ServiceConfig>) -> Config {
    Config {
        services,
        ..Default::default()
    }
}
