//! hz - Smart development proxy.
//!
//! A single stable ingress for several local services: declarative
//! routing rules, live configuration reload, health-checked backends,
//! transparent WebSocket forwarding, an optional request inspector, and
//! an optional external tunnel for webhook testing.

pub mod cli;
pub mod config;
pub mod http;
pub mod inspector;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod tunnel;

pub use config::Config;
pub use lifecycle::{App, AppOptions, Shutdown};
pub use registry::Registry;
pub use routing::RouteTable;
