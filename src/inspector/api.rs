//! Inspector HTTP surface, served on loopback only.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::ReceiverStream;

use crate::inspector::{ui, CapturedExchange, Inspector};

/// Build the inspector router.
pub fn router(inspector: Inspector) -> Router {
    Router::new()
        .route("/", get(serve_ui))
        .route("/inspect/http", get(serve_ui))
        .route("/api/requests", get(list_requests))
        .route("/api/requests/sse", get(stream_requests))
        .route("/api/requests/clear", post(clear_requests))
        .route("/api/request/{id}", get(request_detail))
        .with_state(inspector)
}

/// Bind the loopback listener and serve until shutdown.
pub async fn serve(
    inspector: Inspector,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([127, 0, 0, 1], inspector.port()));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "web inspector available");

    axum::serve(listener, router(inspector))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

async fn serve_ui() -> Html<&'static str> {
    Html(ui::INSPECTOR_HTML)
}

async fn list_requests(State(inspector): State<Inspector>) -> Json<Vec<CapturedExchange>> {
    Json(inspector.snapshot())
}

/// Current ring contents followed by the live feed, as server-sent
/// events.
async fn stream_requests(
    State(inspector): State<Inspector>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let snapshot = inspector.snapshot();
    let live = ReceiverStream::new(inspector.subscribe());

    let stream = futures_util::stream::iter(snapshot)
        .chain(live)
        .map(|record| Ok(to_event(&record)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_event(record: &CapturedExchange) -> Event {
    let data = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

async fn clear_requests(State(inspector): State<Inspector>) -> Json<serde_json::Value> {
    inspector.clear();
    Json(serde_json::json!({ "status": "cleared" }))
}

async fn request_detail(
    State(inspector): State<Inspector>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match inspector.get(&id) {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, "request not found").into_response(),
    }
}
