//! # Tether Framework
//!
//! Adapts plain async functions into HTTP request handlers.
//!
//! A handler declares what it needs through its parameter types and what it
//! produces through its return type:
//!
//! ```rust,ignore
//! use tether_framework::prelude::*;
//!
//! #[derive(Deserialize, FormSchema)]
//! struct ArticleQuery {
//!     category: String,
//!     id: i64,
//! }
//!
//! #[derive(Deserialize, FormSchema)]
//! struct Rename {
//!     #[form(required)]
//!     newname: String,
//! }
//!
//! async fn article(Get(q): Get<ArticleQuery>, Post(rename): Post<Rename>) -> Response {
//!     match rename {
//!         Some(r) => Response::format(format_args!("renamed to {}", r.newname)),
//!         None => Response::format(format_args!("{} #{}", q.category, q.id)),
//!     }
//! }
//!
//! let service = wrap(article, [with_error_handler(json_errors)]);
//! ```
//!
//! [`wrap`] resolves every parameter and the return type once, failing
//! loudly for anything it cannot serve. The resulting [`Wrapped`] runs the
//! prebuilt pipeline per request and is a `tower::Service`.

pub mod decode;
pub mod error;
pub mod extract;
pub mod handler;
pub mod options;
pub mod reply;
pub mod service;
pub mod wrap;

pub use decode::{FormSchema, FormValues};
pub use error::{ArgumentMismatch, DecodeError, DecodeResult, FormError, WrapError};
pub use extract::{
    DEFAULT_MAX_MEMORY, ExtractConfig, Extractor, ExtractorRegistry, Get, Json, Param, ParamInfo,
    Post,
};
pub use handler::Handler;
pub use options::{
    ContextWrapper, WrapOption, WrapOptions, with_context_wrapper, with_error_handler,
    with_max_memory, with_parameter_type, with_return_type,
};
pub use reply::{Reply, ReturnHandler, ReturnRegistry};
pub use wrap::{Wrapped, try_wrap, wrap};

pub use tether_core;

/// The types and functions most handlers need.
pub mod prelude {
    pub use crate::{
        FormSchema, Get, Json, Param, Post, Reply, Wrapped, try_wrap, with_context_wrapper,
        with_error_handler, with_max_memory, with_parameter_type, with_return_type, wrap,
    };
    pub use tether_core::{Context, Request, Response, ResponseWriter, Teardown};
}
