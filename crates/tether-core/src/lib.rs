//! # Tether Core
//!
//! The request and response primitives shared by every Tether crate:
//!
//! - [`Request`]: a buffered request with path variables and a [`Context`]
//! - [`Context`]: cancellation, deadline, error handler and typed values for one request
//! - [`ResponseSink`], [`Recorder`] and [`ResponseWriter`]: where responses are written
//! - [`Response`] and [`Render`]: values that know how to write themselves
//!
//! Nothing here knows about handler signatures; that lives in `tether-framework`.

pub mod context;
pub mod error;
pub mod request;
pub mod response;
pub mod sink;

pub use context::{Context, Teardown};
pub use error::{RenderError, RenderResult};
pub use request::{PathVars, Request};
pub use response::{DelegateFn, ErrorHandler, Render, Response, not_found_handler};
pub use sink::{Recorder, ResponseSink, ResponseWriter, StatusOverride, body_allowed};

pub use bytes::Bytes;
pub use http;
