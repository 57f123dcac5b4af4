//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config snapshot → registry + route table → listeners → serve
//!
//! Reload:
//!     Config subscriber → registry.sync deltas → route table rebuild
//!
//! Shutdown (shutdown.rs + signals.rs):
//!     SIGINT/SIGTERM → stop accepting → cancel probes and watcher
//!     → drain with deadline → stop inspector and tunnel
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has a deadline: remaining handlers are interrupted after
//!   the drain window

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{App, AppOptions, StartupError};
