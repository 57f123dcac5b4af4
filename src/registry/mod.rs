//! Service registry and health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Config snapshot
//!     → register / sync (delta: add, remove, update)
//!     → name-keyed map of Arc<Service>
//!     → one probe task per service with a health block (probe.rs)
//!     → probe outcomes update per-service health state
//!     → transitions fan out as RegistryEvents to subscribers
//! ```
//!
//! # Design Decisions
//! - The registry map is the authoritative health source; events are
//!   advisory and dropped when a subscriber lags
//! - Probe tasks notice their service was removed or replaced on the
//!   next tick and exit on their own
//! - Counters live in a sibling map keyed by name so reloads do not
//!   reset them for surviving services

pub mod probe;
pub mod service;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::lifecycle::Shutdown;

pub use service::{HealthStatus, Service, ServiceStats};

/// Capacity of each subscriber's event queue.
const EVENT_QUEUE: usize = 100;

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service name is required")]
    MissingName,

    #[error("service {0} has no target")]
    MissingTarget(String),

    #[error("invalid target URL for service {name}: {source}")]
    InvalidTarget {
        name: String,
        #[source]
        source: url::ParseError,
    },

    #[error("service not found: {0}")]
    NotFound(String),
}

/// A change in the service registry.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub service: Arc<Service>,
}

/// Kind of registry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEventKind {
    ServiceAdded,
    ServiceRemoved,
    ServiceUpdated,
    ServiceHealthChanged,
}

/// Registry of backend services with per-service health probing.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    services: RwLock<HashMap<String, Arc<Service>>>,
    stats: DashMap<String, Arc<ServiceStats>>,
    subscribers: Mutex<Vec<mpsc::Sender<RegistryEvent>>>,
    probe_client: reqwest::Client,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                services: RwLock::new(HashMap::new()),
                stats: DashMap::new(),
                subscribers: Mutex::new(Vec::new()),
                probe_client: reqwest::Client::new(),
                shutdown: Shutdown::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a service and start its probe task, if configured.
    pub fn register(&self, config: ServiceConfig) -> Result<Arc<Service>, RegistryError> {
        let stats = self
            .inner
            .stats
            .entry(config.name.clone())
            .or_default()
            .clone();
        let service = Arc::new(Service::from_config(config, stats)?);

        self.inner
            .services
            .write()
            .expect("registry lock poisoned")
            .insert(service.name.clone(), service.clone());

        self.emit(RegistryEventKind::ServiceAdded, service.clone());
        self.spawn_probe_if_configured(&service);

        tracing::debug!(service = %service.name, target = %service.target, "service registered");
        Ok(service)
    }

    /// Register every service from a snapshot.
    pub fn register_all(&self, configs: &[ServiceConfig]) -> Result<(), RegistryError> {
        for config in configs {
            self.register(config.clone())?;
        }
        Ok(())
    }

    /// Remove a service. Its probe task exits on the next tick; requests
    /// already holding the service finish against it.
    pub fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        let removed = self
            .inner
            .services
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        self.emit(RegistryEventKind::ServiceRemoved, removed);
        tracing::debug!(service = %name, "service deregistered");
        Ok(())
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.inner
            .services
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// All registered services, sorted by name for stable output.
    pub fn list(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self
            .inner
            .services
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// The fallback service, if one is registered.
    pub fn default_service(&self) -> Option<Arc<Service>> {
        self.inner
            .services
            .read()
            .expect("registry lock poisoned")
            .values()
            .find(|s| s.default)
            .cloned()
    }

    /// Apply a new snapshot: deregister services that disappeared,
    /// register new ones, replace the ones whose configuration changed.
    /// Unchanged services keep their probe task and health state.
    pub fn sync(&self, configs: &[ServiceConfig]) -> Result<(), RegistryError> {
        let incoming: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        let existing: Vec<String> = {
            self.inner
                .services
                .read()
                .expect("registry lock poisoned")
                .keys()
                .cloned()
                .collect()
        };

        for name in existing {
            if !incoming.contains(name.as_str()) {
                self.deregister(&name)?;
            }
        }

        for config in configs {
            match self.get(&config.name) {
                None => {
                    self.register(config.clone())?;
                }
                Some(current) if current.config == *config => {}
                Some(_) => {
                    let stats = self
                        .inner
                        .stats
                        .entry(config.name.clone())
                        .or_default()
                        .clone();
                    let replacement = Arc::new(Service::from_config(config.clone(), stats)?);
                    self.inner
                        .services
                        .write()
                        .expect("registry lock poisoned")
                        .insert(replacement.name.clone(), replacement.clone());
                    self.emit(RegistryEventKind::ServiceUpdated, replacement.clone());
                    self.spawn_probe_if_configured(&replacement);
                    tracing::debug!(service = %replacement.name, "service updated");
                }
            }
        }
        Ok(())
    }

    /// Subscribe to registry events on a bounded queue. Events are
    /// dropped rather than blocking when the subscriber lags.
    pub fn subscribe(&self) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(tx);
        rx
    }

    /// True when no registered service is currently unhealthy.
    pub fn healthy(&self) -> bool {
        self.inner
            .services
            .read()
            .expect("registry lock poisoned")
            .values()
            .all(|s| s.status() != HealthStatus::Unhealthy)
    }

    /// Trigger shutdown and wait for every probe task to exit.
    pub async fn stop(&self) {
        self.inner.shutdown.trigger();
        let tasks: Vec<_> = self
            .inner
            .tasks
            .lock()
            .expect("task lock poisoned")
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Whether `service` is still the registered instance for its name.
    /// Probe loops use this to notice removal or replacement.
    pub(crate) fn still_current(&self, service: &Arc<Service>) -> bool {
        self.inner
            .services
            .read()
            .expect("registry lock poisoned")
            .get(&service.name)
            .map(|current| Arc::ptr_eq(current, service))
            .unwrap_or(false)
    }

    pub(crate) fn emit(&self, kind: RegistryEventKind, service: Arc<Service>) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            // Lagging subscribers lose events; health in the map stays
            // authoritative.
            let _ = tx.try_send(RegistryEvent {
                kind,
                service: service.clone(),
            });
        }
    }

    fn spawn_probe_if_configured(&self, service: &Arc<Service>) {
        let has_probe = service
            .health_config
            .as_ref()
            .is_some_and(|h| !h.path.is_empty());
        if !has_probe {
            return;
        }
        let handle = probe::spawn(
            self.clone(),
            service.clone(),
            self.inner.probe_client.clone(),
            self.inner.shutdown.subscribe(),
        );
        self.inner
            .tasks
            .lock()
            .expect("task lock poisoned")
            .push(handle);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn config(name: &str, target: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        registry.register(config("a", "http://127.0.0.1:3001")).unwrap();
        let svc = registry.get("a").unwrap();
        assert_eq!(svc.status(), HealthStatus::Unknown);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_register_emits_event() {
        let registry = Registry::new();
        let mut events = registry.subscribe();
        registry.register(config("a", "http://127.0.0.1:3001")).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, RegistryEventKind::ServiceAdded);
        assert_eq!(event.service.name, "a");
    }

    #[tokio::test]
    async fn test_deregister() {
        let registry = Registry::new();
        registry.register(config("a", "http://127.0.0.1:3001")).unwrap();
        let mut events = registry.subscribe();
        registry.deregister("a").unwrap();
        assert!(registry.get("a").is_none());
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, RegistryEventKind::ServiceRemoved);

        assert!(matches!(
            registry.deregister("a"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_computes_deltas() {
        let registry = Registry::new();
        registry
            .register_all(&[
                config("keep", "http://127.0.0.1:3001"),
                config("drop", "http://127.0.0.1:3002"),
                config("change", "http://127.0.0.1:3003"),
            ])
            .unwrap();

        let kept_before = registry.get("keep").unwrap();
        let mut changed = config("change", "http://127.0.0.1:3033");
        changed.default = true;

        registry
            .sync(&[
                config("keep", "http://127.0.0.1:3001"),
                changed,
                config("new", "http://127.0.0.1:3004"),
            ])
            .unwrap();

        assert!(registry.get("drop").is_none());
        assert!(registry.get("new").is_some());
        // Unchanged service keeps its instance (and so its probe task).
        assert!(Arc::ptr_eq(&kept_before, &registry.get("keep").unwrap()));
        assert_eq!(
            registry.get("change").unwrap().target.as_str(),
            "http://127.0.0.1:3033/"
        );
    }

    #[tokio::test]
    async fn test_stats_survive_sync() {
        let registry = Registry::new();
        registry.register(config("a", "http://127.0.0.1:3001")).unwrap();
        registry
            .get("a")
            .unwrap()
            .stats
            .requests
            .fetch_add(7, Ordering::Relaxed);

        registry.sync(&[config("a", "http://127.0.0.1:9999")]).unwrap();
        assert_eq!(registry.get("a").unwrap().stats.requests(), 7);
    }

    #[tokio::test]
    async fn test_default_service() {
        let registry = Registry::new();
        let mut cfg = config("a", "http://127.0.0.1:3001");
        cfg.default = true;
        registry.register(cfg).unwrap();
        registry.register(config("b", "http://127.0.0.1:3002")).unwrap();
        assert_eq!(registry.default_service().unwrap().name, "a");
    }
}
