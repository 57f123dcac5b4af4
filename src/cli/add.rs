//! `hz add` - append a service to the configuration.

use std::path::PathBuf;

use crate::cli::{read_document, resolve_config_path, write_document, CliError};
use crate::config::{RewriteConfig, RouteConfig, ServiceConfig};

pub(crate) fn run(
    config_flag: &Option<PathBuf>,
    name: &str,
    target_arg: &str,
    default: bool,
    routes: &[String],
    rewrite: Option<&str>,
) -> Result<(), CliError> {
    // A bare port means a localhost target.
    let target = match target_arg.parse::<u16>() {
        Ok(port) => format!("http://localhost:{port}"),
        Err(_) => target_arg.to_string(),
    };

    let mut service = ServiceConfig {
        name: name.to_string(),
        target: target.clone(),
        default,
        routes: routes.iter().map(|r| parse_route_arg(r)).collect(),
        ..Default::default()
    };

    if let Some(prefix) = rewrite {
        service.rewrite = Some(RewriteConfig {
            prefix: Some(prefix.to_string()),
            ..Default::default()
        });
    }

    let path = resolve_config_path(config_flag)?;
    let mut config = read_document(&path)?;

    if config.services.iter().any(|s| s.name == name) {
        return Err(CliError::msg(format!(
            "service '{name}' already exists. Use 'hz remove {name}' first"
        )));
    }

    if default {
        for existing in &mut config.services {
            existing.default = false;
        }
    }
    config.services.push(service.clone());

    write_document(&path, &config)?;

    println!("Added service '{name}' -> {target}");
    if !service.routes.is_empty() {
        println!("  Routes:");
        for route in &service.routes {
            if let Some(path) = &route.path {
                println!("    path: {path}");
            }
            if let Some(header) = &route.header {
                println!("    header: {header}");
            }
            if let Some(subdomain) = &route.subdomain {
                println!("    subdomain: {subdomain}");
            }
        }
    }
    if default {
        println!("  Default: yes");
    }

    Ok(())
}

/// Parse a route argument: `path:/api/*`, `header:x-service=api`,
/// `subdomain:app`, or a bare path.
fn parse_route_arg(arg: &str) -> RouteConfig {
    let mut route = RouteConfig::default();

    if let Some(rest) = arg.strip_prefix("header:") {
        route.header = Some(rest.to_string());
    } else if let Some(rest) = arg.strip_prefix("subdomain:") {
        route.subdomain = Some(rest.to_string());
    } else if let Some(rest) = arg.strip_prefix("path:") {
        route.path = Some(rest.to_string());
    } else {
        route.path = Some(arg.to_string());
    }

    route
}
