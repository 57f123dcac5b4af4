//! Streaming HTTP forwarder.
//!
//! # Responsibilities
//! - Rewrite the outgoing request (scheme, authority, Host, forwarding
//!   headers, service-injected headers)
//! - Stream request and response bodies without buffering
//! - Map upstream failures to gateway statuses and error counters

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{
    HeaderName, CONNECTION, CONTENT_LENGTH, HOST, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::uri::{Authority, PathAndQuery, Scheme, Uri};
use axum::http::{HeaderValue, Request, Response, StatusCode};

use crate::http::ProxyStats;
use crate::routing::matcher::request_host;
use crate::routing::CompiledRoute;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that describe the client connection rather than the request
/// and must not travel upstream.
const HOP_BY_HOP: [HeaderName; 7] = [
    CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Upstream HTTP client wrapper.
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    /// Build the upstream client with its transport tunables.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Forward `req` to the route's service. Always yields a response;
    /// the optional string is the upstream error for the capture record.
    pub async fn forward(
        &self,
        mut req: Request<Body>,
        route: &CompiledRoute,
        peer: SocketAddr,
        stats: &ProxyStats,
    ) -> (Response<Body>, Option<String>) {
        // Inspect framing before the director strips hop-by-hop headers.
        let has_body = req
            .headers()
            .get(CONTENT_LENGTH)
            .map(|v| v.as_bytes() != b"0")
            .unwrap_or_else(|| req.headers().contains_key(TRANSFER_ENCODING));

        direct(&mut req, route, peer);

        let (parts, body) = req.into_parts();
        let url = match reqwest::Url::parse(&parts.uri.to_string()) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(uri = %parts.uri, error = %e, "rewritten URI is not a valid URL");
                return self.fail(route, stats, StatusCode::BAD_GATEWAY, e.to_string());
            }
        };

        let mut builder = self
            .client
            .request(parts.method.clone(), url)
            .headers(parts.headers.clone());
        if has_body {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match builder.send().await {
            Ok(upstream) => {
                let status = upstream.status();
                let headers = upstream.headers().clone();

                let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
                *response.status_mut() = status;
                for (name, value) in headers.iter() {
                    if !HOP_BY_HOP.contains(name) {
                        response.headers_mut().append(name.clone(), value.clone());
                    }
                }
                (response, None)
            }
            Err(e) => {
                let status = map_error(&e);
                tracing::warn!(
                    service = %route.service.name,
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %e,
                    "upstream request failed"
                );
                self.fail(route, stats, status, e.to_string())
            }
        }
    }

    fn fail(
        &self,
        route: &CompiledRoute,
        stats: &ProxyStats,
        status: StatusCode,
        error: String,
    ) -> (Response<Body>, Option<String>) {
        route.service.stats.errors.fetch_add(1, Ordering::Relaxed);
        stats.total_errors.fetch_add(1, Ordering::Relaxed);
        (minimal_response(status), Some(error))
    }
}

/// Plain-text gateway response with the canonical reason as body.
pub fn minimal_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::from(
        status.canonical_reason().unwrap_or("error").to_string(),
    ));
    *response.status_mut() = status;
    response
}

/// Rewrite the outgoing request in place: target scheme and authority,
/// Host, forwarding headers, then service-injected headers.
fn direct(req: &mut Request<Body>, route: &CompiledRoute, peer: SocketAddr) {
    let service = &route.service;
    let authority = service.authority();
    let original_host = request_host(req).unwrap_or_default().to_string();

    let mut parts = req.uri().clone().into_parts();
    parts.scheme = Some(if service.target.scheme() == "https" {
        Scheme::HTTPS
    } else {
        Scheme::HTTP
    });
    match authority.parse::<Authority>() {
        Ok(auth) => parts.authority = Some(auth),
        Err(e) => {
            tracing::error!(authority = %authority, error = %e, "invalid target authority");
            return;
        }
    }
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    match Uri::from_parts(parts) {
        Ok(uri) => *req.uri_mut() = uri,
        Err(e) => {
            tracing::error!(error = %e, "failed to assemble upstream URI");
            return;
        }
    }

    let headers = req.headers_mut();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }

    // Developer-local upstreams commonly virtualhost-match on Host, so
    // it is rewritten to the target rather than passed through.
    if let Ok(value) = HeaderValue::from_str(&authority) {
        headers.insert(HOST, value);
    }

    let mut forwarded_for = peer.ip().to_string();
    if let Some(prior) = headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        forwarded_for = format!("{prior}, {forwarded_for}");
    }
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
    if let Ok(value) = HeaderValue::from_str(&original_host) {
        headers.insert(X_FORWARDED_HOST.clone(), value);
    }
    headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));

    for (name, value) in service.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }
}

/// Timeout-category failures become 504, everything else (EOF included)
/// becomes 502.
fn map_error(err: &reqwest::Error) -> StatusCode {
    if is_timeout(err) {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = e.source();
    }
    false
}
