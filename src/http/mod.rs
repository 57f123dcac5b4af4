//! HTTP proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (dispatcher: counters, upgrade detection, routing)
//!     → forward.rs (director + streaming upstream exchange)
//!       or websocket.rs (upstream dial + full-duplex bridge)
//!     → response streamed back, exchange captured for the inspector
//! ```
//!
//! # Design Decisions
//! - Every path reaches the dispatcher; `/__hz/health` is the single
//!   reserved path
//! - The chosen route travels with the request, never through globals
//! - Counters are plain atomics, read back by the status surface

pub mod forward;
pub mod server;
pub mod websocket;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

pub use forward::Forwarder;
pub use server::{router, AppState};

/// Global proxy counters.
#[derive(Debug, Default)]
pub struct ProxyStats {
    pub total_requests: AtomicU64,
    pub active_requests: AtomicI64,
    pub total_errors: AtomicU64,
    pub websocket_conns: AtomicI64,
}

/// Point-in-time view of [`ProxyStats`], for JSON surfaces.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub active_requests: i64,
    pub total_errors: u64,
    pub websocket_conns: i64,
}

impl ProxyStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            websocket_conns: self.websocket_conns.load(Ordering::Relaxed),
        }
    }
}

/// RAII guard for the active-request gauge.
pub(crate) struct ActiveRequestGuard {
    stats: Arc<ProxyStats>,
}

impl ActiveRequestGuard {
    pub(crate) fn new(stats: Arc<ProxyStats>) -> Self {
        stats.active_requests.fetch_add(1, Ordering::Relaxed);
        Self { stats }
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.stats.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_request_guard() {
        let stats = Arc::new(ProxyStats::default());
        {
            let _guard = ActiveRequestGuard::new(stats.clone());
            assert_eq!(stats.snapshot().active_requests, 1);
        }
        assert_eq!(stats.snapshot().active_requests, 0);
    }
}
