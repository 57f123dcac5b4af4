//! External tunnel integration.
//!
//! # Responsibilities
//! - Resolve provider credentials: explicit token from the config,
//!   otherwise the provider's own config file locations
//! - Drive the provider agent as a child process forwarding the public
//!   endpoint into the proxy listener
//! - Track tunnel status; a disabled or failed tunnel never blocks
//!   proxy startup
//!
//! # Design Decisions
//! - The agent's stdout is scanned for the advertised public URL and
//!   then drained so the pipe never fills
//! - The auth token travels via the agent's environment and is never
//!   logged

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::TunnelConfig;

/// How long to wait for the agent to advertise its public URL.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised while starting or stopping the tunnel. All of them are
/// logged by the caller; none abort proxy startup.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error(
        "no auth token configured and none found in the provider config; \
         run 'ngrok config add-authtoken <token>' or 'hz tunnel --token <token>'"
    )]
    NoCredentials,

    #[error("unsupported tunnel provider: {0}")]
    UnsupportedProvider(String),

    #[error("failed to launch tunnel agent: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("tunnel agent exited before advertising a public URL")]
    AgentExited,

    #[error("tunnel agent did not advertise a public URL within {0:?}")]
    Timeout(Duration),
}

/// Current tunnel state.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tunnel lifecycle manager.
pub struct Manager {
    config: TunnelConfig,
    status: Arc<RwLock<TunnelStatus>>,
    child: Mutex<Option<Child>>,
}

impl Manager {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            status: Arc::new(RwLock::new(TunnelStatus::default())),
            child: Mutex::new(None),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> TunnelStatus {
        self.status.read().expect("tunnel status lock poisoned").clone()
    }

    /// Launch the provider agent forwarding to `local_addr`. Returns the
    /// public URL, or `None` when the tunnel is disabled in config.
    pub async fn start(&self, local_addr: SocketAddr) -> Result<Option<String>, TunnelError> {
        if !self.config.enabled {
            return Ok(None);
        }
        if self.config.provider != "ngrok" {
            return Err(TunnelError::UnsupportedProvider(self.config.provider.clone()));
        }

        let (token, system_domain) = self.resolve_credentials()?;
        let domain = self.config.domain.clone().or(system_domain);

        let mut command = Command::new("ngrok");
        command
            .arg("http")
            .arg(local_addr.to_string())
            .arg("--log")
            .arg("stdout")
            .arg("--log-format")
            .arg("logfmt")
            .env("NGROK_AUTHTOKEN", token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(domain) = &domain {
            command.arg("--domain").arg(domain);
        }
        if !self.config.region.is_empty() {
            command.arg("--region").arg(&self.config.region);
        }

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().ok_or(TunnelError::AgentExited)?;
        let mut lines = BufReader::new(stdout).lines();

        let url = tokio::time::timeout(STARTUP_TIMEOUT, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(url) = parse_public_url(&line) {
                    return Ok(url);
                }
            }
            Err(TunnelError::AgentExited)
        })
        .await
        .map_err(|_| TunnelError::Timeout(STARTUP_TIMEOUT));

        let url = match url {
            Ok(Ok(url)) => url,
            Ok(Err(e)) | Err(e) => {
                let _ = child.start_kill();
                self.record_error(&e);
                return Err(e);
            }
        };

        *self.status.write().expect("tunnel status lock poisoned") = TunnelStatus {
            active: true,
            public_url: Some(url.clone()),
            started_at: Some(Utc::now()),
            error: None,
        };
        *self.child.lock().await = Some(child);

        // Keep draining agent output; when it stops, the tunnel is gone.
        let status = self.status.clone();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "hz::tunnel", line = %line, "agent output");
            }
            let mut status = status.write().expect("tunnel status lock poisoned");
            if status.active {
                status.active = false;
                status.error = Some("tunnel agent exited".to_string());
                tracing::warn!("tunnel agent exited");
            }
        });

        tracing::info!(url = %url, "tunnel established");
        Ok(Some(url))
    }

    /// Kill the agent, if running.
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        let mut status = self.status.write().expect("tunnel status lock poisoned");
        status.active = false;
        tracing::info!("tunnel closed");
    }

    fn resolve_credentials(&self) -> Result<(String, Option<String>), TunnelError> {
        if !self.config.authtoken.is_empty() {
            return Ok((self.config.authtoken.clone(), None));
        }
        tracing::debug!("no auth token in config, checking provider config locations");
        load_provider_credentials().ok_or(TunnelError::NoCredentials)
    }

    fn record_error(&self, error: &TunnelError) {
        let mut status = self.status.write().expect("tunnel status lock poisoned");
        status.active = false;
        status.error = Some(error.to_string());
    }
}

/// The provider's own config layout, both the v3 (`agent.authtoken`)
/// and v2 (top-level `authtoken`) shapes.
#[derive(Debug, Deserialize, Default)]
struct ProviderConfig {
    #[serde(default)]
    agent: ProviderAgent,
    #[serde(default)]
    authtoken: String,
    #[serde(default)]
    tunnels: BTreeMap<String, ProviderTunnel>,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderAgent {
    #[serde(default)]
    authtoken: String,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderTunnel {
    #[serde(default)]
    domain: String,
}

/// Provider config locations, most specific first.
fn provider_config_paths() -> Vec<PathBuf> {
    let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_default();
    let mut paths = Vec::new();

    if cfg!(target_os = "macos") {
        paths.push(
            home.join("Library")
                .join("Application Support")
                .join("ngrok")
                .join("ngrok.yml"),
        );
    } else if cfg!(target_os = "linux") {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("ngrok").join("ngrok.yml"));
        }
        paths.push(home.join(".config").join("ngrok").join("ngrok.yml"));
    } else if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            paths.push(PathBuf::from(appdata).join("ngrok").join("ngrok.yml"));
        }
    }

    // v2 fallback location.
    paths.push(home.join(".ngrok2").join("ngrok.yml"));
    paths
}

/// Search the provider's config locations; first file with a token wins.
pub fn load_provider_credentials() -> Option<(String, Option<String>)> {
    for path in provider_config_paths() {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(found) = parse_provider_config(&raw) {
            tracing::debug!(path = %path.display(), "found provider credentials");
            return Some(found);
        }
    }
    None
}

fn parse_provider_config(raw: &str) -> Option<(String, Option<String>)> {
    let config: ProviderConfig = serde_yaml::from_str(raw).ok()?;

    let token = if !config.agent.authtoken.is_empty() {
        config.agent.authtoken
    } else if !config.authtoken.is_empty() {
        config.authtoken
    } else {
        return None;
    };

    let domain = config
        .tunnels
        .values()
        .map(|t| t.domain.clone())
        .find(|d| !d.is_empty());

    Some((token, domain))
}

/// Extract the `url=` token from an agent logfmt line.
fn parse_public_url(line: &str) -> Option<String> {
    let start = line.find("url=")? + 4;
    let rest = &line[start..];
    let url = rest.split_whitespace().next()?.trim_matches('"');
    if url.starts_with("http") {
        Some(url.to_string())
    } else {
        None
    }
}
