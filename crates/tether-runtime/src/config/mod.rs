//! Configuration module for the Tether runtime.
//!
//! Loads server and logging settings from files, environment variables and
//! code, and validates them before anything starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ServerConfig, SpanEventConfig,
    TetherConfig,
};
pub use validation::validate_config;
