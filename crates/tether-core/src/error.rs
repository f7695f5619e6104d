//! Error types for the core crate.

use thiserror::Error;

/// Errors raised while writing a response.
///
/// By the time one of these surfaces the status line may already be on the
/// wire, so callers log them rather than trying to render another response.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Writing to the sink failed.
    #[error("failed to write response: {0}")]
    Io(#[from] std::io::Error),

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// Custom rendering error.
    #[error("{0}")]
    Custom(String),
}

impl RenderError {
    /// Creates a custom render error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
