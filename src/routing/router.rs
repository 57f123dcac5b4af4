//! Route table: compilation, ordering, and lookup.
//!
//! # Responsibilities
//! - Compile service rules into an ordered route list
//! - Keep the default service in a separate fallback slot
//! - Answer `match_request` with the first matching route
//!
//! # Design Decisions
//! - The list and the fallback slot swap together under one writer
//!   lock, so a request sees exactly one table generation
//! - Ordering is total: priority descending, then pattern length
//!   descending, then insertion order (the sort is stable)
//! - A rule with no clauses would match nothing and is skipped at
//!   compile time

use std::sync::{Arc, RwLock};

use axum::http::Request;

use crate::config::RouteConfig;
use crate::registry::Service;
use crate::routing::matcher::{self, Clause};

/// A compiled rule bound to its service.
pub struct CompiledRoute {
    /// Original path pattern, used as the specificity key.
    pub pattern: String,
    pub priority: i32,
    pub service: Arc<Service>,
    clauses: Vec<Clause>,
}

impl CompiledRoute {
    fn compile(service: Arc<Service>, config: &RouteConfig) -> Option<Self> {
        let clauses = matcher::compile(config);
        if clauses.is_empty() {
            return None;
        }
        Some(Self {
            pattern: config.path.clone().unwrap_or_default(),
            priority: config.priority,
            service,
            clauses,
        })
    }

    fn fallback(service: Arc<Service>) -> Self {
        Self {
            pattern: "*".to_string(),
            priority: 0,
            service,
            clauses: Vec::new(),
        }
    }

    /// True when every populated clause matches.
    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        self.clauses.iter().all(|clause| clause.matches(req))
    }

    /// True when this is the fallback slot entry.
    pub fn is_fallback(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .field("service", &self.service.name)
            .finish()
    }
}

/// Ordered route list plus fallback slot.
pub struct RouteTable {
    inner: RwLock<TableInner>,
}

#[derive(Default)]
struct TableInner {
    routes: Vec<Arc<CompiledRoute>>,
    default_route: Option<Arc<CompiledRoute>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TableInner::default()),
        }
    }

    /// Compile routes for `services` and atomically replace both the
    /// ordered list and the fallback slot.
    pub fn build(&self, services: &[Arc<Service>]) {
        let mut routes = Vec::new();
        let mut default_route = None;

        for service in services {
            if service.default {
                default_route = Some(Arc::new(CompiledRoute::fallback(service.clone())));
            }
            for rule in &service.config.routes {
                match CompiledRoute::compile(service.clone(), rule) {
                    Some(route) => routes.push(Arc::new(route)),
                    None => tracing::warn!(
                        service = %service.name,
                        "skipping route rule with no clauses"
                    ),
                }
            }
        }

        // Stable sort keeps insertion order for full ties.
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.pattern.len().cmp(&a.pattern.len()))
        });

        let mut inner = self.inner.write().expect("route table lock poisoned");
        inner.routes = routes;
        inner.default_route = default_route;
    }

    /// First matching route in table order, falling back to the default
    /// slot; `None` only when no default service exists.
    pub fn match_request<B>(&self, req: &Request<B>) -> Option<Arc<CompiledRoute>> {
        let inner = self.inner.read().expect("route table lock poisoned");
        for route in &inner.routes {
            if route.matches(req) {
                return Some(route.clone());
            }
        }
        inner.default_route.clone()
    }

    /// Number of compiled (non-fallback) routes.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("route table lock poisoned")
            .routes
            .len()
    }

    /// True when no routes are compiled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
