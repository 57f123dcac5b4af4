//! Request dispatcher and proxy router.
//!
//! # Responsibilities
//! - Serve the `/__hz/health` self-check
//! - Route every other path through the dispatcher
//! - Detect WebSocket upgrades and hand them to the WS forwarder
//! - Maintain global counters and capture exchanges for the inspector

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::forward::{minimal_response, Forwarder};
use crate::http::{websocket, ActiveRequestGuard, ProxyStats};
use crate::inspector::{ExchangeRecord, Inspector};
use crate::registry::Registry;
use crate::routing::{rewrite, RouteTable};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub registry: Registry,
    pub stats: Arc<ProxyStats>,
    pub forwarder: Arc<Forwarder>,
    pub inspector: Option<Inspector>,
}

/// Build the proxy router with its middleware layers.
pub fn router(state: AppState, write_timeout: Duration) -> Router {
    Router::new()
        .route("/__hz/health", get(health))
        .fallback(dispatch)
        .with_state(state)
        .layer(TimeoutLayer::new(write_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Listener self-check. The only reserved path.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "stats": state.stats.snapshot(),
    }))
}

/// Main dispatcher: classify, match, rewrite, forward, capture.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    state.stats.total_requests.fetch_add(1, Ordering::Relaxed);
    let _active = ActiveRequestGuard::new(state.stats.clone());
    let started = Instant::now();

    if websocket::is_upgrade_request(req.headers()) {
        return websocket::handle(state, req).await;
    }

    // Capture request metadata before rewrite and director mutate it.
    let record = state
        .inspector
        .as_ref()
        .map(|_| ExchangeRecord::begin(&req, peer));

    let Some(route) = state.routes.match_request(&req) else {
        tracing::warn!(method = %req.method(), path = %req.uri().path(), "no matching route");
        if let (Some(inspector), Some(record)) = (&state.inspector, record) {
            inspector.capture(record.finish(
                None,
                StatusCode::BAD_GATEWAY,
                started.elapsed(),
                Some("no matching route".to_string()),
            ));
        }
        return minimal_response(StatusCode::BAD_GATEWAY);
    };

    tracing::debug!(
        method = %req.method(),
        path = %req.uri().path(),
        service = %route.service.name,
        "routing request"
    );

    route.service.stats.requests.fetch_add(1, Ordering::Relaxed);

    let mut req = req;
    if let Some(rewrite_config) = &route.service.rewrite {
        rewrite::apply(rewrite_config, &mut req);
    }

    let (response, error) = state.forwarder.forward(req, &route, peer, &state.stats).await;

    if let (Some(inspector), Some(record)) = (&state.inspector, record) {
        inspector.capture(record.finish(
            Some(&route),
            response.status(),
            started.elapsed(),
            error,
        ));
    }

    response
}
