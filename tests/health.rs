//! Health probing tests.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hz::config::HealthConfig;
use hz::registry::{HealthStatus, Registry, RegistryEvent, RegistryEventKind};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_health_event(
    events: &mut mpsc::Receiver<RegistryEvent>,
) -> Option<RegistryEvent> {
    loop {
        match timeout(Duration::from_secs(3), events.recv()).await {
            Ok(Some(event)) if event.kind == RegistryEventKind::ServiceHealthChanged => {
                return Some(event)
            }
            Ok(Some(_)) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_health_transitions_emit_one_event_each() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let backend = common::start_programmable_backend(move |_path| {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "ok".to_string())
            } else {
                (500, "boom".to_string())
            }
        }
    })
    .await;

    let registry = Registry::new();
    let mut events = registry.subscribe();

    let mut config = common::service("svc", backend);
    config.health = Some(HealthConfig {
        path: "/h".to_string(),
        interval: Duration::from_millis(200),
        timeout: Duration::from_millis(100),
    });
    registry.register(config).unwrap();

    // Several successful probes produce exactly one transition event.
    let event = next_health_event(&mut events).await.expect("healthy event");
    assert_eq!(event.service.status(), HealthStatus::Healthy);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        events.try_recv().is_err(),
        "repeat healthy probes are silent"
    );

    // Flip the backend; exactly one further event.
    healthy.store(false, Ordering::SeqCst);
    let event = next_health_event(&mut events).await.expect("unhealthy event");
    assert_eq!(event.service.status(), HealthStatus::Unhealthy);
    assert!(registry.get("svc").unwrap().last_check().is_some());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        events.try_recv().is_err(),
        "repeat unhealthy probes are silent"
    );

    registry.stop().await;
}

#[tokio::test]
async fn test_unreachable_target_marked_unhealthy() {
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let registry = Registry::new();
    let mut events = registry.subscribe();

    let mut config = common::service("dead", dead_addr);
    config.health = Some(HealthConfig {
        path: "/h".to_string(),
        interval: Duration::from_millis(200),
        timeout: Duration::from_millis(100),
    });
    registry.register(config).unwrap();

    let event = next_health_event(&mut events).await.expect("unhealthy event");
    assert_eq!(event.service.status(), HealthStatus::Unhealthy);
    // Probe failure never removes the backend.
    assert!(registry.get("dead").is_some());

    registry.stop().await;
}

#[tokio::test]
async fn test_unhealthy_backend_still_receives_traffic() {
    // Health probes observe /h failing while ordinary paths keep
    // working; dispatch must not gate on health.
    let backend = common::start_programmable_backend(|path| async move {
        if path == "/h" {
            (500, "down".to_string())
        } else {
            (200, format!("svc:{path}"))
        }
    })
    .await;

    let mut svc = common::service("svc", backend);
    svc.default = true;
    svc.health = Some(HealthConfig {
        path: "/h".to_string(),
        interval: Duration::from_millis(200),
        timeout: Duration::from_millis(100),
    });

    let proxy = common::start_proxy(common::config_with(vec![svc])).await;
    let client = common::test_client();

    // Give the probe time to mark the service unhealthy.
    let mut status = HealthStatus::Unknown;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = proxy.registry.get("svc").unwrap().status();
        if status == HealthStatus::Unhealthy {
            break;
        }
    }
    assert_eq!(status, HealthStatus::Unhealthy);

    let body = client
        .get(proxy.url("/data"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "svc:/data");

    proxy.shutdown.trigger();
}
