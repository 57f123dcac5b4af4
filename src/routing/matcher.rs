//! Route matching logic.
//!
//! # Responsibilities
//! - Compile declarative rule clauses (path, header, subdomain, method)
//! - Evaluate clauses against a request; populated clauses AND together
//!
//! # Design Decisions
//! - Header names match case-insensitively, values byte-exactly
//! - Paths are lexically cleaned on both sides, so traversal sequences
//!   never escape a prefix
//! - No regex, matching stays linear in the path length

use axum::http::header::HOST;
use axum::http::{HeaderName, Method, Request};

use crate::config::RouteConfig;

/// One compiled matching clause.
#[derive(Debug, Clone)]
pub enum Clause {
    /// Path pattern, `/api/*` style.
    Path(String),
    /// Header equality, first value wins.
    Header { name: HeaderName, value: String },
    /// Host begins with `label.`.
    Subdomain(String),
    /// Exact method.
    Method(Method),
}

impl Clause {
    /// Evaluate this clause against a request.
    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        match self {
            Clause::Path(pattern) => match_path(req.uri().path(), pattern),
            Clause::Header { name, value } => req
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == value.as_str()),
            Clause::Subdomain(label) => request_host(req)
                .is_some_and(|host| match_subdomain(host, label)),
            Clause::Method(method) => req.method() == method,
        }
    }
}

/// Compile a rule's populated fields into clauses. Empty strings count
/// as absent. An unparsable header predicate is dropped with a warning.
pub fn compile(config: &RouteConfig) -> Vec<Clause> {
    let mut clauses = Vec::new();

    if let Some(path) = populated(&config.path) {
        clauses.push(Clause::Path(path.to_string()));
    }

    if let Some(header) = populated(&config.header) {
        match parse_header_clause(header) {
            Some(clause) => clauses.push(clause),
            None => tracing::warn!(rule = %header, "ignoring unparsable header rule"),
        }
    }

    if let Some(subdomain) = populated(&config.subdomain) {
        clauses.push(Clause::Subdomain(subdomain.to_string()));
    }

    if let Some(method) = populated(&config.method) {
        match Method::from_bytes(method.to_uppercase().as_bytes()) {
            Ok(method) => clauses.push(Clause::Method(method)),
            Err(_) => tracing::warn!(rule = %method, "ignoring invalid method rule"),
        }
    }

    clauses
}

fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `Name=Value` (or the legacy `Name:Value`), trimming whitespace
/// around both sides.
fn parse_header_clause(raw: &str) -> Option<Clause> {
    let (name, value) = raw.split_once('=').or_else(|| raw.split_once(':'))?;
    let name: HeaderName = name.trim().parse().ok()?;
    Some(Clause::Header {
        name,
        value: value.trim().to_string(),
    })
}

/// Match a URL path against a pattern.
///
/// `/api/*` matches `/api` and any descendant; a trailing bare `*`
/// matches any path beginning with the literal prefix; anything else
/// matches by prefix, including exact equality.
pub fn match_path(url_path: &str, pattern: &str) -> bool {
    if url_path == pattern {
        return true;
    }

    let url_path = clean_path(url_path);
    let pattern = clean_path(pattern);

    if let Some(prefix) = pattern.strip_suffix("/*") {
        return url_path == prefix || url_path.starts_with(&format!("{prefix}/"));
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return url_path.starts_with(prefix);
    }

    url_path.starts_with(pattern.as_str())
}

/// Match a request host against a subdomain label; the port is stripped
/// first.
pub fn match_subdomain(host: &str, label: &str) -> bool {
    let host = host.split(':').next().unwrap_or(host);
    host.starts_with(&format!("{label}."))
}

/// Lexical path cleaning: resolves `.` and `..` segments, collapses
/// duplicate slashes, and never ascends past the root.
pub(crate) fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::with_capacity(path.len());
    out.push('/');
    out.push_str(&segments.join("/"));
    out
}

/// The request host, from the `Host` header or the URI authority.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request(method: &str, path: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/api/users/"), "/api/users");
        assert_eq!(clean_path("//api//users"), "/api/users");
        assert_eq!(clean_path("/api/./users"), "/api/users");
        assert_eq!(clean_path("/api/../users"), "/users");
        assert_eq!(clean_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn test_match_path_wildcard() {
        assert!(match_path("/api", "/api/*"));
        assert!(match_path("/api/users", "/api/*"));
        assert!(match_path("/api/users/42", "/api/*"));
        assert!(!match_path("/apiv2", "/api/*"));
        assert!(!match_path("/other", "/api/*"));
    }

    #[test]
    fn test_match_path_bare_star() {
        assert!(match_path("/apiv2", "/api*"));
        assert!(match_path("/api", "/api*"));
        assert!(!match_path("/app", "/api*"));
    }

    #[test]
    fn test_match_path_prefix() {
        assert!(match_path("/api", "/api"));
        assert!(match_path("/api/users", "/api"));
        assert!(!match_path("/v1/api", "/api"));
    }

    #[test]
    fn test_match_path_rejects_traversal() {
        assert!(!match_path("/api/../admin", "/api/*"));
        assert!(match_path("/admin/../api/x", "/api/*"));
    }

    #[test]
    fn test_header_clause() {
        let clause = parse_header_clause("b-service=sabry").unwrap();
        assert!(clause.matches(&request("GET", "/x", &[("b-service", "sabry")])));
        assert!(clause.matches(&request("GET", "/x", &[("B-Service", "sabry")])));
        assert!(!clause.matches(&request("GET", "/x", &[("b-service", "Sabry")])));
        assert!(!clause.matches(&request("GET", "/x", &[])));
    }

    #[test]
    fn test_header_clause_trims_and_accepts_colon() {
        let clause = parse_header_clause(" x-kind : ws ").unwrap();
        assert!(clause.matches(&request("GET", "/", &[("x-kind", "ws")])));
        assert!(parse_header_clause("no-separator").is_none());
    }

    #[test]
    fn test_subdomain_clause() {
        assert!(match_subdomain("api.localhost", "api"));
        assert!(match_subdomain("api.localhost:3000", "api"));
        assert!(!match_subdomain("localhost", "api"));
        assert!(!match_subdomain("apix.localhost", "api"));
    }

    #[test]
    fn test_method_clause() {
        let clauses = compile(&RouteConfig {
            method: Some("post".to_string()),
            ..Default::default()
        });
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].matches(&request("POST", "/", &[])));
        assert!(!clauses[0].matches(&request("GET", "/", &[])));
    }

    #[test]
    fn test_compile_skips_empty_fields() {
        let clauses = compile(&RouteConfig {
            path: Some("  ".to_string()),
            header: Some(String::new()),
            ..Default::default()
        });
        assert!(clauses.is_empty());
    }
}
