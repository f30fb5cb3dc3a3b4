//! RakshaNet Agent - configuration, wiring and command line
//!
//! Glues [`raksha_cache`] and [`raksha_safety`] into one client:
//! [`AgentConfig`] loads the TOML file, [`init_tracing`] installs logging,
//! and [`RakshaApp`] owns the wired components the `raksha` binary drives.

#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::{AppError, Platform, RakshaApp};
pub use config::{AgentConfig, ConfigError, LoggingConfig, CONFIG_ENV};
pub use telemetry::init_tracing;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
