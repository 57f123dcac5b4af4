//! Periodic health probing.
//!
//! One task per service with a configured probe. The loop exits when
//! shutdown is triggered or when its service is no longer the current
//! registration for that name.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::registry::{HealthStatus, Registry, RegistryEventKind, Service};

/// Spawn the probe loop for `service`.
pub(crate) fn spawn(
    registry: Registry,
    service: Arc<Service>,
    client: reqwest::Client,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(probe_loop(registry, service, client, shutdown))
}

async fn probe_loop(
    registry: Registry,
    service: Arc<Service>,
    client: reqwest::Client,
    mut shutdown: broadcast::Receiver<()>,
) {
    let Some(health) = service.health_config.clone() else {
        return;
    };

    let url = probe_url(&service, &health.path);
    let mut ticker = tokio::time::interval(health.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::debug!(service = %service.name, url = %url, "health probe started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            // The first tick fires immediately, giving services an
            // initial probe right after registration.
            _ = ticker.tick() => {
                if !registry.still_current(&service) {
                    break;
                }
                let status = check(&client, &url, health.timeout).await;
                let previous = service.set_status(status);
                if previous != status {
                    tracing::info!(
                        service = %service.name,
                        from = %previous,
                        to = %status,
                        "service health changed"
                    );
                    registry.emit(RegistryEventKind::ServiceHealthChanged, service.clone());
                }
            }
        }
    }

    tracing::debug!(service = %service.name, "health probe stopped");
}

/// A 2xx response is healthy; any other status, and any transport, DNS,
/// or timeout failure, is unhealthy.
async fn check(client: &reqwest::Client, url: &str, timeout: Duration) -> HealthStatus {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => HealthStatus::Healthy,
        Ok(response) => {
            tracing::debug!(url = %url, status = %response.status(), "probe returned non-2xx");
            HealthStatus::Unhealthy
        }
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "probe failed");
            HealthStatus::Unhealthy
        }
    }
}

fn probe_url(service: &Service, path: &str) -> String {
    let target = service.target.as_str().trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{target}/{path}")
}
