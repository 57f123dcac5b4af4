//! Request inspection subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher finishes an exchange
//!     → capture(record): assign req_N id, prepend to the ring
//!     → ring evicts from the tail beyond capacity
//!     → record offered to each subscriber queue, non-blocking
//!     → api.rs serves the ring and a live SSE feed on loopback
//! ```
//!
//! # Design Decisions
//! - Newest-first storage makes snapshot reads O(1) at the interesting
//!   end
//! - The ring lock and the subscriber lock are separate and never held
//!   together
//! - Slow subscribers lose records instead of back-pressuring capture

pub mod api;
pub mod ui;

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::Request;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::routing::matcher::request_host;
use crate::routing::CompiledRoute;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default loopback port for the inspector surface.
pub const DEFAULT_PORT: u16 = 4040;

/// Queue depth for each live-feed subscriber.
const SUBSCRIBER_QUEUE: usize = 16;

/// A fully captured request/response exchange.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedExchange {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub host: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub query: String,
    pub content_length: i64,
    pub remote_addr: String,
    pub service: String,
    pub target: String,
    pub status_code: u16,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request-side metadata collected when an exchange starts, before the
/// rewrite and director stages mutate the request.
#[derive(Debug)]
pub struct ExchangeRecord {
    timestamp: DateTime<Utc>,
    method: String,
    path: String,
    host: String,
    headers: BTreeMap<String, Vec<String>>,
    query: String,
    content_length: i64,
    remote_addr: String,
}

impl ExchangeRecord {
    /// Snapshot the request side of an exchange.
    pub fn begin<B>(req: &Request<B>, peer: SocketAddr) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in req.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let content_length = req
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            timestamp: Utc::now(),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            host: request_host(req).unwrap_or_default().to_string(),
            headers,
            query: req.uri().query().unwrap_or_default().to_string(),
            content_length,
            remote_addr: peer.to_string(),
        }
    }

    /// Complete the record with the response side. The id is assigned
    /// at capture time.
    pub fn finish(
        self,
        route: Option<&CompiledRoute>,
        status: axum::http::StatusCode,
        duration: Duration,
        error: Option<String>,
    ) -> CapturedExchange {
        CapturedExchange {
            id: String::new(),
            timestamp: self.timestamp,
            method: self.method,
            path: self.path,
            host: self.host,
            headers: self.headers,
            query: self.query,
            content_length: self.content_length,
            remote_addr: self.remote_addr,
            service: route.map(|r| r.service.name.clone()).unwrap_or_default(),
            target: route
                .map(|r| r.service.target.to_string())
                .unwrap_or_default(),
            status_code: status.as_u16(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            error,
        }
    }
}

/// Bounded in-memory capture ring with live fan-out.
#[derive(Clone)]
pub struct Inspector {
    inner: Arc<InspectorInner>,
}

struct InspectorInner {
    ring: Mutex<Ring>,
    subscribers: Mutex<Vec<mpsc::Sender<CapturedExchange>>>,
    capacity: usize,
    port: u16,
}

struct Ring {
    entries: VecDeque<CapturedExchange>,
    seq: u64,
}

impl Inspector {
    /// Create an inspector with the default capacity.
    pub fn new(port: u16) -> Self {
        Self::with_capacity(port, DEFAULT_CAPACITY)
    }

    /// Create an inspector holding at most `capacity` exchanges.
    pub fn with_capacity(port: u16, capacity: usize) -> Self {
        Self {
            inner: Arc::new(InspectorInner {
                ring: Mutex::new(Ring {
                    entries: VecDeque::with_capacity(capacity),
                    seq: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
                capacity,
                port,
            }),
        }
    }

    /// Loopback port the API surface binds to.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Record an exchange: assign its id, prepend, evict past capacity,
    /// then offer it to subscribers without blocking.
    pub fn capture(&self, mut record: CapturedExchange) {
        {
            let mut ring = self.inner.ring.lock().expect("ring lock poisoned");
            ring.seq += 1;
            record.id = format!("req_{}", ring.seq);
            ring.entries.push_front(record.clone());
            while ring.entries.len() > self.inner.capacity {
                ring.entries.pop_back();
            }
        }

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            let _ = tx.try_send(record.clone());
        }
    }

    /// Current contents, newest first.
    pub fn snapshot(&self) -> Vec<CapturedExchange> {
        self.inner
            .ring
            .lock()
            .expect("ring lock poisoned")
            .entries
            .iter()
            .cloned()
            .collect()
    }

    /// Look up a single exchange by id.
    pub fn get(&self, id: &str) -> Option<CapturedExchange> {
        self.inner
            .ring
            .lock()
            .expect("ring lock poisoned")
            .entries
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Empty the ring. The id sequence keeps counting.
    pub fn clear(&self) {
        self.inner
            .ring
            .lock()
            .expect("ring lock poisoned")
            .entries
            .clear();
    }

    /// Subscribe to the live feed on a bounded queue.
    pub fn subscribe(&self) -> mpsc::Receiver<CapturedExchange> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(tx);
        rx
    }
}
