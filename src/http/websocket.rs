//! WebSocket proxying.
//!
//! The upstream is dialed before the client upgrade so dial failures
//! still produce an HTTP error response. After the upgrade two copier
//! tasks bridge the sides; the first error tears the exchange down and
//! both connections close on exit.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message as TgMessage};

use crate::http::forward::minimal_response;
use crate::http::server::AppState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// True for `Upgrade: websocket` with a `Connection` header containing
/// `upgrade`, both case-insensitive.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    upgrade && connection
}

/// Handle a WebSocket upgrade request: route, dial upstream, upgrade
/// the client, then bridge frames in both directions.
pub async fn handle(state: AppState, req: Request) -> Response {
    let Some(route) = state.routes.match_request(&req) else {
        tracing::warn!(path = %req.uri().path(), "no matching route for websocket");
        return minimal_response(StatusCode::BAD_GATEWAY);
    };

    let service = route.service.clone();
    service.stats.requests.fetch_add(1, Ordering::Relaxed);

    // Clone the target and swap in the ws scheme, keeping the original
    // path and raw query.
    let mut target = service.target.clone();
    let scheme = match target.scheme() {
        "http" => "ws",
        "https" => "wss",
        s => s,
    }
    .to_string();
    if target.set_scheme(&scheme).is_err() {
        tracing::error!(scheme = %scheme, "failed to set websocket scheme");
        return minimal_response(StatusCode::BAD_GATEWAY);
    }
    target.set_path(req.uri().path());
    target.set_query(req.uri().query());

    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "client websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    // Dial the upstream first so a failed dial reports to the client
    // instead of leaking a half-open session.
    let upstream = match tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::connect_async(target.as_str()),
    )
    .await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            if let tungstenite::Error::Http(response) = &e {
                tracing::warn!(
                    target = %target,
                    status = %response.status(),
                    "websocket backend dial failed"
                );
            } else {
                tracing::warn!(target = %target, error = %e, "websocket backend dial failed");
            }
            service.stats.errors.fetch_add(1, Ordering::Relaxed);
            state.stats.total_errors.fetch_add(1, Ordering::Relaxed);
            return minimal_response(StatusCode::BAD_GATEWAY);
        }
        Err(_) => {
            tracing::warn!(target = %target, "websocket backend handshake timed out");
            service.stats.errors.fetch_add(1, Ordering::Relaxed);
            state.stats.total_errors.fetch_add(1, Ordering::Relaxed);
            return minimal_response(StatusCode::BAD_GATEWAY);
        }
    };

    tracing::debug!(service = %service.name, target = %target, "websocket session established");

    let stats = state.stats.clone();
    // Origin checks stay permissive; this proxy fronts local dev
    // services.
    ws.on_upgrade(move |client| async move {
        stats.websocket_conns.fetch_add(1, Ordering::Relaxed);
        bridge(client, upstream).await;
        stats.websocket_conns.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(service = %service.name, "websocket session closed");
    })
}

type UpstreamSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Copy frames in both directions until either side errors or closes.
async fn bridge(client: WebSocket, upstream: UpstreamSocket) {
    let (mut upstream_sink, mut upstream_stream) = upstream.split();
    let (mut client_sink, mut client_stream) = client.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_stream.next().await {
            let msg = match msg {
                Message::Text(t) => TgMessage::Text(t.to_string().into()),
                Message::Binary(b) => TgMessage::Binary(b.into()),
                Message::Ping(p) => TgMessage::Ping(p.into()),
                Message::Pong(p) => TgMessage::Pong(p.into()),
                Message::Close(frame) => TgMessage::Close(frame.map(to_upstream_close)),
            };
            if let Err(e) = upstream_sink.send(msg).await {
                tracing::debug!(error = %e, "error forwarding to backend");
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_stream.next().await {
            let msg = match msg {
                TgMessage::Text(t) => Message::Text(t.to_string().into()),
                TgMessage::Binary(b) => Message::Binary(b.into()),
                TgMessage::Ping(p) => Message::Ping(p.into()),
                TgMessage::Pong(p) => Message::Pong(p.into()),
                TgMessage::Close(frame) => Message::Close(frame.map(to_client_close)),
                _ => continue,
            };
            if let Err(e) = client_sink.send(msg).await {
                tracing::debug!(error = %e, "error forwarding to client");
                break;
            }
        }
    };

    // Either direction finishing ends the exchange; dropping the halves
    // closes both connections.
    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}

fn to_upstream_close(
    frame: axum::extract::ws::CloseFrame,
) -> tungstenite::protocol::CloseFrame {
    tungstenite::protocol::CloseFrame {
        code: frame.code.into(),
        reason: frame.reason.to_string().into(),
    }
}

fn to_client_close(
    frame: tungstenite::protocol::CloseFrame,
) -> axum::extract::ws::CloseFrame {
    axum::extract::ws::CloseFrame {
        code: frame.code.into(),
        reason: frame.reason.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                name.parse::<axum::http::HeaderName>().unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_is_upgrade_request() {
        assert!(is_upgrade_request(&headers(&[
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
        ])));
        assert!(is_upgrade_request(&headers(&[
            ("upgrade", "WebSocket"),
            ("connection", "keep-alive, upgrade"),
        ])));
        assert!(!is_upgrade_request(&headers(&[("upgrade", "websocket")])));
        assert!(!is_upgrade_request(&headers(&[("connection", "upgrade")])));
        assert!(!is_upgrade_request(&headers(&[])));
    }
}
