//! Runtime representation of a backend service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::config::{HealthConfig, RewriteConfig, ServiceConfig};
use crate::registry::RegistryError;

/// Service health state.
///
/// `Unknown` only exists between registration and the first completed
/// probe; once probed, a service moves between `Healthy` and
/// `Unhealthy` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Per-service counters.
///
/// Kept in a name-keyed structure owned by the registry, not in the
/// service itself, so a reload that re-creates a surviving service does
/// not reset its counters.
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
}

impl ServiceStats {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// A registered backend service.
///
/// Configuration-derived fields are immutable; the registry's probe
/// loop is the only writer to the health state, under the per-service
/// lock. Requests in flight hold their own `Arc<Service>`, so a service
/// removed by a reload stays alive until the last exchange completes.
pub struct Service {
    pub name: String,
    pub target: Url,
    pub default: bool,
    pub rewrite: Option<RewriteConfig>,
    pub headers: HeaderMap,
    pub health_config: Option<HealthConfig>,
    pub stats: Arc<ServiceStats>,
    /// Source configuration, used for reload delta detection.
    pub(crate) config: ServiceConfig,
    health: RwLock<HealthState>,
}

#[derive(Debug, Clone, Copy)]
struct HealthState {
    status: HealthStatus,
    last_check: Option<DateTime<Utc>>,
}

impl Service {
    /// Build a runtime service from its validated configuration.
    pub fn from_config(
        config: ServiceConfig,
        stats: Arc<ServiceStats>,
    ) -> Result<Self, RegistryError> {
        if config.name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        if config.target.is_empty() {
            return Err(RegistryError::MissingTarget(config.name.clone()));
        }
        let target = Url::parse(&config.target).map_err(|source| RegistryError::InvalidTarget {
            name: config.name.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            match (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(
                    service = %config.name,
                    header = %name,
                    "skipping invalid injected header"
                ),
            }
        }

        Ok(Self {
            name: config.name.clone(),
            target,
            default: config.default,
            rewrite: config.rewrite.clone(),
            headers,
            health_config: config.health.clone(),
            stats,
            config,
            health: RwLock::new(HealthState {
                status: HealthStatus::Unknown,
                last_check: None,
            }),
        })
    }

    /// Current health status.
    pub fn status(&self) -> HealthStatus {
        self.health.read().expect("health lock poisoned").status
    }

    /// Timestamp of the last completed probe.
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.health.read().expect("health lock poisoned").last_check
    }

    /// Record a probe outcome, returning the previous status.
    pub(crate) fn set_status(&self, status: HealthStatus) -> HealthStatus {
        let mut state = self.health.write().expect("health lock poisoned");
        let previous = state.status;
        state.status = status;
        state.last_check = Some(Utc::now());
        previous
    }

    /// Target authority (`host` or `host:port`) as written in config.
    pub fn authority(&self) -> String {
        let host = self.target.host_str().unwrap_or_default();
        match self.target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("target", &self.target.as_str())
            .field("default", &self.default)
            .field("status", &self.status())
            .finish()
    }
}
