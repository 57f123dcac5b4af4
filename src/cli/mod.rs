//! The `hz` command line interface.
//!
//! Thin layer over the core: every command either edits the config
//! file, reads status from a running proxy, or boots the proxy. User
//! errors print one line to stderr and exit non-zero.

mod add;
mod init;
mod remove;
mod start;
mod status;
mod tunnel;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{self, Config, ConfigError};
use crate::lifecycle::StartupError;

/// Errors surfaced to the user as a one-line message.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),
}

impl CliError {
    fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// hz - Smart development proxy with ngrok integration.
#[derive(Parser)]
#[command(
    name = "hz",
    version,
    about = "hz - Smart development proxy with ngrok integration",
    long_about = "hz is a development proxy that routes traffic to multiple local services\n\
                  through a single endpoint with integrated ngrok tunnel support.\n\n\
                  Features:\n\
                  \x20 - Multi-service routing (path, header, subdomain based)\n\
                  \x20 - Integrated ngrok tunnel for external access\n\
                  \x20 - Health checking and service discovery\n\
                  \x20 - Hot-reload configuration\n\
                  \x20 - WebSocket support"
)]
pub struct Cli {
    /// Config file (default: hz.yaml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new hz configuration
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Add a service to the configuration
    Add {
        /// Service name
        name: String,
        /// Port number or full target URL
        target: String,
        /// Set as default service
        #[arg(long)]
        default: bool,
        /// Routing rule (path, header:name=value, subdomain:name)
        #[arg(long = "route")]
        routes: Vec<String>,
        /// URL rewrite prefix
        #[arg(long)]
        rewrite: Option<String>,
    },

    /// Remove a service from the configuration
    #[command(aliases = ["rm", "delete"])]
    Remove {
        /// Service name
        name: String,
    },

    /// Start the proxy server
    Start {
        /// Override port from config
        #[arg(short, long)]
        port: Option<u16>,
        /// Disable the tunnel
        #[arg(long)]
        no_tunnel: bool,
        /// Watch config file for changes
        #[arg(short, long, default_value_t = true)]
        watch: bool,
        /// Enable the web request inspector
        #[arg(long)]
        inspect: bool,
        /// Web inspector port
        #[arg(long, default_value_t = crate::inspector::DEFAULT_PORT)]
        inspect_port: u16,
    },

    /// Show proxy and service status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configure tunnel settings
    Tunnel {
        /// Enable the tunnel
        #[arg(long)]
        enable: bool,
        /// Disable the tunnel
        #[arg(long)]
        disable: bool,
        /// Set a custom tunnel domain
        #[arg(long)]
        domain: Option<String>,
        /// Set the tunnel auth token
        #[arg(long)]
        token: Option<String>,
    },
}

/// Run the parsed command.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Init { force } => init::run(force),
        Commands::Add {
            name,
            target,
            default,
            routes,
            rewrite,
        } => add::run(&cli.config, &name, &target, default, &routes, rewrite.as_deref()),
        Commands::Remove { name } => remove::run(&cli.config, &name),
        Commands::Start {
            port,
            no_tunnel,
            watch,
            inspect,
            inspect_port,
        } => start::run(&cli.config, port, no_tunnel, watch, inspect, inspect_port).await,
        Commands::Status { json } => status::run(&cli.config, json).await,
        Commands::Tunnel {
            enable,
            disable,
            domain,
            token,
        } => tunnel::run(&cli.config, enable, disable, domain, token),
    }
}

/// The config path from the flag, or the first conventional location.
pub(crate) fn resolve_config_path(flag: &Option<PathBuf>) -> Result<PathBuf, CliError> {
    match flag {
        Some(path) => Ok(path.clone()),
        None => config::find_config_file()
            .map_err(|_| CliError::msg("no config file found. Run 'hz init' first")),
    }
}

/// Read the config document for editing.
///
/// Editing commands parse the raw file without environment
/// interpolation so `${NAME}` tokens survive the round-trip.
pub(crate) fn read_document(path: &Path) -> Result<Config, CliError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Write the config document back to disk.
pub(crate) fn write_document(path: &Path, config: &Config) -> Result<(), CliError> {
    let data = serde_yaml::to_string(config)?;
    fs::write(path, data)?;
    Ok(())
}
