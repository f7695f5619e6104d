//! # Tether
//!
//! Write HTTP handlers as plain async functions. Tether reads what a handler
//! needs from its parameter types and what it produces from its return type,
//! and builds the glue once, when the handler is wrapped.
//!
//! ## Overview
//!
//! ```text
//! request ──▶ context wrappers ──▶ extractors ──▶ handler ──▶ return handler ──▶ response
//!                 (setup)          (in order,                  (Response, String,
//!                                   fail fast)                  Result, custom)
//!             teardowns run in reverse order once the response is written
//! ```
//!
//! - **core**: `Request`, `Context`, `Response` and the sinks responses are written to
//! - **framework**: `wrap`, the built-in `Get`/`Post`/`Json` parameters and the wrap options
//! - **runtime**: configuration, logging and an axum-backed `Server`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use tether::prelude::*;
//!
//! #[derive(Deserialize, FormSchema)]
//! struct ArticleQuery {
//!     category: String,
//!     id: i64,
//! }
//!
//! async fn article(Get(q): Get<ArticleQuery>) -> Response {
//!     Response::format(format_args!("{} #{}", q.category, q.id))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = tether::runtime::config::load_config()?;
//!     tether::runtime::logging::init_from_config(&config.logging);
//!
//!     Server::from_config(&config)
//!         .handle("/articles/{category}/{id}", article, [])
//!         .serve()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use tether_core as core;
pub use tether_framework as framework;
pub use tether_macros::{FormSchema, Param, Reply};
pub use tether_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    // Wrapping and options
    pub use tether_framework::{
        Wrapped, try_wrap, with_context_wrapper, with_error_handler, with_max_memory,
        with_parameter_type, with_return_type, wrap,
    };

    // Built-in parameters
    pub use tether_framework::{Get, Json, Post};

    // Traits, with derives of the same name
    pub use tether_framework::{FormSchema, Param, Reply};
    pub use tether_macros::{FormSchema, Param, Reply};

    // Request and response primitives
    pub use tether_core::http::StatusCode;
    pub use tether_core::{Context, Request, Response, ResponseWriter, Teardown};

    // Hosting
    pub use tether_runtime::Server;
}
