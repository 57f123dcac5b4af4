//! Application wiring and run loop.
//!
//! # Responsibilities
//! - Construct and connect the subsystems from a config snapshot
//! - Apply reloads: registry delta sync, then route table rebuild
//! - Drive the orderly shutdown sequence

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{self, Config, ConfigError};
use crate::http::{AppState, Forwarder, ProxyStats};
use crate::inspector::{self, Inspector};
use crate::lifecycle::Shutdown;
use crate::registry::{Registry, RegistryError, Service};
use crate::routing::RouteTable;
use crate::tunnel;

/// How long in-flight requests get to finish after shutdown begins.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Feature switches for [`App`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Watch the config file and hot-reload.
    pub watch: bool,
    /// Serve the request inspector.
    pub inspect: bool,
    /// Inspector loopback port.
    pub inspect_port: u16,
    /// Skip the tunnel even when enabled in config.
    pub no_tunnel: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            watch: true,
            inspect: false,
            inspect_port: inspector::DEFAULT_PORT,
            no_tunnel: false,
        }
    }
}

/// The assembled proxy application.
pub struct App {
    manager: config::Manager,
    registry: Registry,
    routes: Arc<RouteTable>,
    stats: Arc<ProxyStats>,
    forwarder: Arc<Forwarder>,
    inspector: Option<Inspector>,
    tunnel: Option<Arc<tunnel::Manager>>,
    options: AppOptions,
}

impl App {
    /// Wire the subsystems from the manager's current snapshot.
    pub fn new(manager: config::Manager, options: AppOptions) -> Result<Self, StartupError> {
        let snapshot = manager.get();

        let registry = Registry::new();
        registry.register_all(&snapshot.services)?;

        let routes = Arc::new(RouteTable::new());
        routes.build(&services_in_config_order(&registry, &snapshot));

        let inspector = options
            .inspect
            .then(|| Inspector::new(options.inspect_port));

        let tunnel = (snapshot.tunnel.enabled && !options.no_tunnel)
            .then(|| Arc::new(tunnel::Manager::new(snapshot.tunnel.clone())));

        Ok(Self {
            manager,
            registry,
            routes,
            stats: Arc::new(ProxyStats::default()),
            forwarder: Arc::new(Forwarder::new()?),
            inspector,
            tunnel,
            options,
        })
    }

    /// The registry backing this app.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Global counters.
    pub fn stats(&self) -> Arc<ProxyStats> {
        self.stats.clone()
    }

    /// Serve the proxy on `listener` until `shutdown` triggers, then
    /// drain with a deadline.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), StartupError> {
        let snapshot = self.manager.get();
        let state = AppState {
            routes: self.routes.clone(),
            registry: self.registry.clone(),
            stats: self.stats.clone(),
            forwarder: self.forwarder.clone(),
            inspector: self.inspector.clone(),
        };
        let router = crate::http::router(state, snapshot.server.write_timeout)
            .into_make_service_with_connect_info::<SocketAddr>();

        if self.options.watch && !self.manager.path().as_os_str().is_empty() {
            let registry = self.registry.clone();
            let routes = self.routes.clone();
            self.manager.subscribe(move |config| {
                apply_reload(&registry, &routes, &config);
            });
            self.manager.watch()?;
        }

        if let Some(inspector) = self.inspector.clone() {
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(e) = inspector::api::serve(inspector, rx).await {
                    tracing::error!(error = %e, "inspector server error");
                }
            });
        }

        if let Some(tunnel) = self.tunnel.clone() {
            let local_addr = listener.local_addr()?;
            tokio::spawn(async move {
                if let Err(e) = tunnel.start(local_addr).await {
                    tracing::warn!(
                        error = %e,
                        "tunnel failed to start, continuing without public ingress"
                    );
                }
            });
        }

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "proxy listening");

        let graceful = {
            let shutdown = shutdown.clone();
            async move { shutdown.wait().await }
        };
        let server = axum::serve(listener, router).with_graceful_shutdown(graceful);
        let mut server_task = tokio::spawn(server.into_future());

        tokio::select! {
            result = &mut server_task => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "server error"),
                    Err(e) => tracing::error!(error = %e, "server task failed"),
                }
            }
            _ = shutdown.wait() => {
                tracing::info!("shutting down");
                self.registry.stop().await;
                self.manager.stop().await;
                if tokio::time::timeout(DRAIN_DEADLINE, &mut server_task)
                    .await
                    .is_err()
                {
                    tracing::warn!("drain deadline exceeded, aborting remaining connections");
                    server_task.abort();
                }
            }
        }

        // Idempotent cleanup for the path where the server ended on its
        // own; also stops the inspector via its shutdown subscription.
        shutdown.trigger();
        self.registry.stop().await;
        self.manager.stop().await;
        if let Some(tunnel) = &self.tunnel {
            tunnel.stop().await;
        }

        tracing::info!("shutdown complete");
        Ok(())
    }
}

/// Registry sync plus route rebuild, in that order, on each reload.
fn apply_reload(registry: &Registry, routes: &RouteTable, config: &Config) {
    tracing::info!("applying reloaded configuration");
    if let Err(e) = registry.sync(&config.services) {
        tracing::error!(error = %e, "failed to apply reloaded services, keeping previous routes");
        return;
    }
    routes.build(&services_in_config_order(registry, config));
}

/// Services in declaration order; the route table's tie-break depends
/// on it.
fn services_in_config_order(registry: &Registry, config: &Config) -> Vec<Arc<Service>> {
    config
        .services
        .iter()
        .filter_map(|c| registry.get(&c.name))
        .collect()
}
