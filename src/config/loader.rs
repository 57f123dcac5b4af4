//! Configuration loading from disk.
//!
//! # Responsibilities
//! - Read the YAML document and interpolate `${NAME}` tokens from the
//!   process environment before parsing
//! - Deserialize with schema defaults applied
//! - Run semantic validation and promote a default service
//! - Locate the config file in conventional locations

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("no config file found, searched: {0}")]
    NotFound(String),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, interpolate, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

/// Parse a configuration document from a string.
///
/// Environment interpolation happens before the YAML parser sees the
/// document, so `${NAME}` works in any position, including quoted scalars.
pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env(raw);
    let mut config: Config = serde_yaml::from_str(&expanded)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    // No explicit default: the first service in declaration order wins.
    if !config.services.iter().any(|s| s.default) {
        if let Some(first) = config.services.first_mut() {
            first.default = true;
        }
    }

    // An explicit zero duration means "unset" and falls back to the
    // probe defaults.
    for service in &mut config.services {
        if let Some(health) = &mut service.health {
            if health.interval.is_zero() {
                health.interval = Duration::from_secs(30);
            }
            if health.timeout.is_zero() {
                health.timeout = Duration::from_secs(5);
            }
        }
    }

    Ok(config)
}

/// Substitute `${NAME}` tokens with values from the process environment.
///
/// Unset variables expand to the empty string. A `$` not followed by `{`
/// passes through untouched.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Ok(value) = std::env::var(name) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated token, keep it literal.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Search for the config file in conventional locations.
pub fn find_config_file() -> Result<PathBuf, ConfigError> {
    let mut candidates = vec![
        PathBuf::from("hz.yaml"),
        PathBuf::from("hz.yml"),
        PathBuf::from(".hz.yaml"),
        PathBuf::from(".hz.yml"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(home).join(".hz").join("config.yaml"));
    }

    for path in &candidates {
        if path.exists() {
            return Ok(fs::canonicalize(path).unwrap_or_else(|_| path.clone()));
        }
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NotFound(searched))
}

/// Starter configuration written by `hz init`.
pub const DEFAULT_CONFIG: &str = r#"# hz - Development Proxy Configuration
version: "1"

server:
  port: 3000
  host: "0.0.0.0"

tunnel:
  enabled: false
  provider: ngrok
  authtoken: "${NGROK_AUTHTOKEN}"

services:
  - name: backend
    target: "http://localhost:3001"
    default: true
    health:
      path: /health
      interval: 30s

logging:
  level: info
  format: text
"#;

/// Write the starter configuration to `path`.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    fs::write(path, DEFAULT_CONFIG)?;
    Ok(())
}
