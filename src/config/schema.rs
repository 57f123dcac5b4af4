//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from `hz.yaml`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Schema version, currently always "1".
    #[serde(default = "default_version")]
    pub version: String,

    /// Listener settings (bind host, port, timeouts).
    pub server: ServerConfig,

    /// External tunnel settings.
    pub tunnel: TunnelConfig,

    /// Backend service definitions, in declaration order.
    pub services: Vec<ServiceConfig>,

    /// Logging settings.
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1".to_string()
}

/// Proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,

    /// Host to bind to.
    pub host: String,

    /// Read timeout for client connections.
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Write timeout for client connections.
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// External tunnel provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TunnelConfig {
    /// Whether the tunnel is started with the proxy.
    pub enabled: bool,

    /// Provider label. Only `ngrok` is recognized today.
    pub provider: String,

    /// Explicit auth token. When empty, the provider's own config
    /// locations are searched at startup.
    pub authtoken: String,

    /// Custom reserved domain, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Provider region.
    pub region: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "ngrok".to_string(),
            authtoken: String::new(),
            domain: None,
            region: "us".to_string(),
        }
    }
}

/// A backend service that can receive proxied requests.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unique service name.
    pub name: String,

    /// Absolute target origin, e.g. `http://localhost:3001`.
    pub target: String,

    /// Marks this service as the fallback when no route matches.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,

    /// Routing rules attached to this service.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,

    /// URL rewrite applied before forwarding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,

    /// Headers injected on forwarded requests, overwriting duplicates.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Optional periodic health probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthConfig>,
}

/// One matching clause binding requests to a service.
///
/// Populated clauses combine conjunctively; a rule with no clauses is
/// rejected at route-compile time.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RouteConfig {
    /// Path pattern. `/api/*` matches the prefix and descendants,
    /// a trailing bare `*` matches any literal prefix, anything else
    /// matches by prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Header predicate, `Name=Value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Subdomain label matched against the request host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,

    /// HTTP method, matched case-insensitively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Rule priority. Higher sorts first; any integer is accepted.
    pub priority: i32,
}

/// URL rewriting rules, applied in field order before dispatch.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RewriteConfig {
    /// Prefix stripped from the path when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,

    /// Prefix prepended when the path does not already start with it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Full path replacement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
}

/// Health probe parameters for a service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Path probed on the target, e.g. `/health`.
    pub path: String,

    /// Probe cadence.
    #[serde(with = "duration_serde")]
    pub interval: Duration,

    /// Per-probe deadline.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format: `text` or `json`.
    pub format: String,

    /// Output destination: `stdout` or `stderr`.
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            output: "stdout".to_string(),
        }
    }
}

/// Serde support for durations written with a units suffix (`100ms`,
/// `30s`, `5m`, `1h`).
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn format_duration(d: &Duration) -> String {
        let millis = d.as_millis();
        if millis % 1000 != 0 {
            return format!("{}ms", millis);
        }
        let secs = d.as_secs();
        if secs >= 60 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(idx) => s.split_at(idx),
            None => (s, "s"),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration: {s:?}"))?;
        match unit.trim() {
            "ms" => Ok(Duration::from_millis(n)),
            "s" => Ok(Duration::from_secs(n)),
            "m" => Ok(Duration::from_secs(n * 60)),
            "h" => Ok(Duration::from_secs(n * 3600)),
            other => Err(format!("unknown duration unit: {other:?}")),
        }
    }
}
