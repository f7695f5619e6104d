//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ServerConfig, TetherConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TetherConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.host.trim().is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }

    if server.max_body_size == 0 {
        return Err(ConfigError::validation(
            "server.max_body_size must be greater than 0",
        ));
    }

    if server.max_multipart_memory == 0 {
        return Err(ConfigError::validation(
            "server.max_multipart_memory must be greater than 0",
        ));
    }

    // A multipart body is read whole, so it can never exceed the body limit.
    if server.max_multipart_memory > server.max_body_size {
        return Err(ConfigError::validation(format!(
            "server.max_multipart_memory ({}) must not exceed server.max_body_size ({})",
            server.max_multipart_memory, server.max_body_size
        )));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(
            "logging.filters module names cannot be empty",
        ));
    }

    Ok(())
}
