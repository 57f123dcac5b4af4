//! `hz tunnel` - edit the tunnel block of the configuration.

use std::path::PathBuf;

use crate::cli::{read_document, resolve_config_path, write_document, CliError};

pub(crate) fn run(
    config_flag: &Option<PathBuf>,
    enable: bool,
    disable: bool,
    domain: Option<String>,
    token: Option<String>,
) -> Result<(), CliError> {
    let path = resolve_config_path(config_flag)?;
    let mut config = read_document(&path)?;
    let mut modified = false;

    if enable {
        config.tunnel.enabled = true;
        modified = true;
        println!("Tunnel enabled");
    }

    if disable {
        config.tunnel.enabled = false;
        modified = true;
        println!("Tunnel disabled");
    }

    if let Some(domain) = domain {
        println!("Tunnel domain set to: {domain}");
        config.tunnel.domain = Some(domain);
        modified = true;
    }

    if let Some(token) = token {
        config.tunnel.authtoken = token;
        modified = true;
        println!("Tunnel auth token updated");
    }

    if !modified {
        println!("Tunnel configuration:");
        println!("  enabled:  {}", config.tunnel.enabled);
        println!("  provider: {}", config.tunnel.provider);
        if let Some(domain) = &config.tunnel.domain {
            println!("  domain:   {domain}");
        }
        if config.tunnel.authtoken.is_empty() {
            println!("  token:    (not set)");
        } else {
            println!("  token:    {}***", mask(&config.tunnel.authtoken));
        }
        return Ok(());
    }

    write_document(&path, &config)?;
    println!();
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn mask(token: &str) -> &str {
    &token[..token.len().min(4)]
}
