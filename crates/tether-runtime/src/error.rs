//! Runtime error types.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while starting or running a server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
