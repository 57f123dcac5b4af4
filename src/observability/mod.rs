//! Observability subsystem.
//!
//! Structured logging via `tracing`; subsystems attach fields at call
//! sites and the subscriber renders text or JSON per the logging config.

pub mod logging;
