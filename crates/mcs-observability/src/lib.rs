//! # mcs-observability
//!
//! Logging bootstrap for the inventory engine, built on the tracing
//! ecosystem. Library crates only emit `tracing` events; binaries call
//! [`init_logging`] (or a custom [`LoggingConfig`]) once at startup.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
