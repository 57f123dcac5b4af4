//! URL path rewriting applied before dispatch.

use axum::http::uri::{PathAndQuery, Uri};
use axum::http::Request;

use crate::config::RewriteConfig;

/// Apply rewrite rules to a path, in order: strip prefix, add prefix,
/// full replace.
pub fn rewrite_path(rewrite: &RewriteConfig, path: &str) -> String {
    let mut path = path.to_string();

    if let Some(strip) = populated(&rewrite.strip_prefix) {
        if let Some(rest) = path.strip_prefix(strip) {
            path = rest.to_string();
        }
        if !path.starts_with('/') {
            path = format!("/{path}");
        }
    }

    if let Some(prefix) = populated(&rewrite.prefix) {
        if !path.starts_with(prefix) {
            path = format!("{prefix}{path}");
        }
    }

    if let Some(replace) = populated(&rewrite.replace) {
        path = replace.to_string();
    }

    path
}

/// Rewrite the request URI's path in place, preserving the raw query.
pub fn apply<B>(rewrite: &RewriteConfig, req: &mut Request<B>) {
    let current = req.uri().path();
    let rewritten = rewrite_path(rewrite, current);
    if rewritten == current {
        return;
    }

    let path_and_query = match req.uri().query() {
        Some(query) => format!("{rewritten}?{query}"),
        None => rewritten,
    };

    match path_and_query.parse::<PathAndQuery>() {
        Ok(pq) => {
            let mut parts = req.uri().clone().into_parts();
            parts.path_and_query = Some(pq);
            match Uri::from_parts(parts) {
                Ok(uri) => *req.uri_mut() = uri,
                Err(e) => tracing::warn!(error = %e, "rewrite produced invalid URI"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "rewrite produced invalid path"),
    }
}

fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(prefix: &str) -> RewriteConfig {
        RewriteConfig {
            strip_prefix: Some(prefix.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(rewrite_path(&strip("/api"), "/api/users/42"), "/users/42");
        assert_eq!(rewrite_path(&strip("/api"), "/api"), "/");
        assert_eq!(rewrite_path(&strip("/api"), "/other"), "/other");
    }

    #[test]
    fn test_strip_prefix_is_noop_twice_when_absent() {
        let rw = strip("/api");
        let once = rewrite_path(&rw, "/users");
        let twice = rewrite_path(&rw, &once);
        assert_eq!(once, "/users");
        assert_eq!(twice, "/users");
    }

    #[test]
    fn test_add_prefix() {
        let rw = RewriteConfig {
            prefix: Some("/v2".to_string()),
            ..Default::default()
        };
        assert_eq!(rewrite_path(&rw, "/users"), "/v2/users");
        // Already prefixed paths pass through.
        assert_eq!(rewrite_path(&rw, "/v2/users"), "/v2/users");
    }

    #[test]
    fn test_replace_is_idempotent() {
        let rw = RewriteConfig {
            replace: Some("/fixed".to_string()),
            ..Default::default()
        };
        assert_eq!(rewrite_path(&rw, "/anything/at/all"), "/fixed");
        assert_eq!(rewrite_path(&rw, "/fixed"), "/fixed");
    }

    #[test]
    fn test_order_strip_then_prefix_then_replace() {
        let rw = RewriteConfig {
            strip_prefix: Some("/old".to_string()),
            prefix: Some("/new".to_string()),
            replace: None,
        };
        assert_eq!(rewrite_path(&rw, "/old/thing"), "/new/thing");
    }

    #[test]
    fn test_apply_preserves_query() {
        let mut req = Request::builder()
            .uri("/api/users?page=2&sort=asc")
            .body(())
            .unwrap();
        apply(&strip("/api"), &mut req);
        assert_eq!(req.uri().path(), "/users");
        assert_eq!(req.uri().query(), Some("page=2&sort=asc"));
    }
}
