//! Tether Runtime - hosting for wrapped handlers.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `TetherConfig`)
//! - Logging setup driven by that configuration (`LoggingBuilder`)
//! - An axum-backed HTTP server that routes paths to `Wrapped` handlers (`Server`)
//!
//! ```ignore
//! use tether_runtime::{Server, config::load_config, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     Server::from_config(&config)
//!         .handle("/articles/{category}/{id}", article, [])
//!         .serve()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, ServerConfig, TetherConfig};
pub use error::{ServerError, ServerResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use server::Server;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the common logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
