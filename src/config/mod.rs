//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! hz.yaml
//!     → loader.rs (env interpolation, parse, defaults)
//!     → validation.rs (semantic checks, default promotion)
//!     → Config (validated, immutable)
//!     → store.rs hands out Arc<Config> snapshots
//!
//! On file write:
//!     watcher.rs detects the change
//!     → 100 ms coalesce window
//!     → loader + validation run again
//!     → store swaps the snapshot atomically and notifies subscribers
//!     → a failed reload is logged and the old snapshot stays current
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable once published; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{create_default_config, find_config_file, load_config, ConfigError};
pub use schema::{
    Config, HealthConfig, LoggingConfig, RewriteConfig, RouteConfig, ServerConfig, ServiceConfig,
    TunnelConfig,
};
pub use store::Manager;
