//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, host, headers)
//!     → router.rs (ordered scan of compiled routes)
//!     → matcher.rs (evaluate clauses, AND semantics)
//!     → matched CompiledRoute, or the default slot, or nothing
//!
//! Route compilation (startup and each reload):
//!     ServiceConfig rules
//!     → compile clauses, drop empty rules
//!     → sort by priority, then pattern length, then insertion order
//!     → swap list + default slot atomically
//! ```
//!
//! # Design Decisions
//! - Routes are immutable once compiled; reloads build a fresh table
//! - Deterministic: equal inputs always match the same route
//! - The default route lives outside the ordered list and is consulted
//!   only after every compiled rule has been tried

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use router::{CompiledRoute, RouteTable};
