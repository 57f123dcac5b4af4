//! `hz status` - probe a running proxy and print service state.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cli::{resolve_config_path, CliError};
use crate::config::{self, Config};

#[derive(Serialize)]
struct StatusReport {
    running: bool,
    address: String,
    config: String,
    services: Vec<ServiceReport>,
    tunnel: TunnelReport,
}

#[derive(Serialize)]
struct ServiceReport {
    name: String,
    target: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    default: bool,
    status: String,
    routes: usize,
}

#[derive(Serialize)]
struct TunnelReport {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
}

pub(crate) async fn run(config_flag: &Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let path = resolve_config_path(config_flag)?;
    let config = config::load_config(&path)?;

    let report = build_report(&config, path.display().to_string()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("hz status");
    println!("---------");
    if report.running {
        println!("proxy:   running at {}", report.address);
    } else {
        println!("proxy:   not running");
    }
    println!("config:  {}", report.config);

    println!();
    println!("services:");
    for service in &report.services {
        let default_mark = if service.default { " [default]" } else { "" };
        println!(
            "  {} -> {}{}  ({})",
            service.name, service.target, default_mark, service.status
        );
        if service.routes > 0 {
            println!("    routes: {}", service.routes);
        }
    }

    println!();
    if report.tunnel.enabled {
        println!("tunnel:  enabled");
        if let Some(domain) = &report.tunnel.domain {
            println!("  domain: {domain}");
        }
    } else {
        println!("tunnel:  disabled");
    }
    println!();

    Ok(())
}

async fn build_report(config: &Config, config_path: String) -> StatusReport {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap_or_default();

    let address = format!("http://{}:{}", config.server.host, config.server.port);
    let running = client
        .get(format!("{address}/__hz/health"))
        .send()
        .await
        .is_ok();

    let mut services = Vec::new();
    for service in &config.services {
        let status = if running {
            probe_service(&client, service).await
        } else {
            "configured".to_string()
        };
        services.push(ServiceReport {
            name: service.name.clone(),
            target: service.target.clone(),
            default: service.default,
            status,
            routes: service.routes.len(),
        });
    }

    StatusReport {
        running,
        address,
        config: config_path,
        services,
        tunnel: TunnelReport {
            enabled: config.tunnel.enabled,
            domain: config.tunnel.domain.clone(),
        },
    }
}

async fn probe_service(client: &reqwest::Client, service: &config::ServiceConfig) -> String {
    match &service.health {
        Some(health) if !health.path.is_empty() => {
            let url = format!(
                "{}/{}",
                service.target.trim_end_matches('/'),
                health.path.trim_start_matches('/')
            );
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => "healthy".to_string(),
                Ok(_) => "unhealthy".to_string(),
                Err(_) => "unreachable".to_string(),
            }
        }
        _ => match client.get(&service.target).send().await {
            Ok(_) => "reachable".to_string(),
            Err(_) => "unreachable".to_string(),
        },
    }
}
