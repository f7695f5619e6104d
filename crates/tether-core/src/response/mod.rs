//! Response values.
//!
//! Handlers return a [`Response`] (or something convertible to one) and the
//! dispatcher renders it onto the request's [`ResponseSink`]. Every variant
//! knows how to write itself; decorators such as [`Response::with_header`]
//! and [`Response::override_status`] wrap another response and adjust the
//! sink before delegating.
//!
//! ```rust,ignore
//! use tether_core::Response;
//!
//! Response::not_found("no such article");
//! Response::redirect(StatusCode::FOUND, "/login/");
//! Response::string("hello").with_header("x-served-by", HeaderValue::from_static("tether"));
//! Response::handler(not_found_handler()).override_status(StatusCode::NOT_ACCEPTABLE);
//! ```

mod file;
mod status;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{
    self, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, IntoHeaderName, LOCATION,
};
use http::StatusCode;
use serde::Serialize;

use crate::error::RenderError;
use crate::request::Request;
use crate::sink::{ResponseSink, StatusOverride};

/// Callback that takes over rendering of status/message responses.
///
/// Bind one to a request's [`Context`](crate::Context) to render errors in
/// your own format.
pub type ErrorHandler = Arc<dyn Fn(StatusCode, &str, &Request) -> Response + Send + Sync>;

/// A low-level writer that a response can delegate to.
pub type DelegateFn = Arc<dyn Fn(&mut dyn ResponseSink, &Request) -> io::Result<()> + Send + Sync>;

/// Anything that can write itself onto a sink.
#[async_trait]
pub trait Render: Send + Sync {
    /// Writes this response for `request`.
    async fn render(&self, sink: &mut dyn ResponseSink, request: &Request)
    -> Result<(), RenderError>;
}

/// A response returned from a handler.
#[derive(Clone)]
pub enum Response {
    /// A status code with a short message.
    ///
    /// Rendered through the request's [`ErrorHandler`] if one is bound,
    /// otherwise as a plain-text body.
    Status { code: StatusCode, message: String },
    /// A raw body.
    Bytes(Bytes),
    /// A pre-serialized JSON body.
    Json(Bytes),
    /// A file from disk.
    File(PathBuf),
    /// In-memory content served with file semantics.
    Content {
        name: String,
        modified: Option<SystemTime>,
        data: Bytes,
    },
    /// A redirect to `location`.
    Redirect { code: StatusCode, location: String },
    /// Delegates to a low-level writer.
    Handler(DelegateFn),
    /// Sets headers, then renders `parent`.
    WithHeaders {
        parent: Box<Response>,
        headers: HeaderMap,
    },
    /// Renders `parent` with its status code replaced by `code`.
    OverrideStatus { parent: Box<Response>, code: StatusCode },
    /// A caller-defined renderer.
    Custom(Arc<dyn Render>),
}

impl Response {
    /// A status/message response.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// `500 Internal Server Error` carrying the error's text.
    pub fn error(err: impl fmt::Display) -> Self {
        Self::status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    /// `204 No Content`.
    pub fn no_content() -> Self {
        Self::status(StatusCode::NO_CONTENT, "")
    }

    /// A plain string body.
    pub fn string(data: impl Into<String>) -> Self {
        Self::Bytes(Bytes::from(data.into()))
    }

    /// A raw byte body.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    /// A body built from format arguments, as in `Response::format(format_args!(..))`.
    pub fn format(args: fmt::Arguments<'_>) -> Self {
        Self::string(fmt::format(args))
    }

    /// Serializes `value` as JSON.
    ///
    /// A value that fails to serialize becomes a 500 response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(mut body) => {
                body.push(b'\n');
                Self::Json(body.into())
            }
            Err(e) => Self::error(e),
        }
    }

    /// Serves a file from disk.
    pub fn serve_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Serves in-memory content; `name` selects the content type.
    pub fn serve_content(
        name: impl Into<String>,
        modified: Option<SystemTime>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::Content {
            name: name.into(),
            modified,
            data: data.into(),
        }
    }

    /// Redirects to `location`.
    pub fn redirect(code: StatusCode, location: impl Into<String>) -> Self {
        Self::Redirect {
            code,
            location: location.into(),
        }
    }

    /// Delegates rendering to a low-level writer.
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(&mut dyn ResponseSink, &Request) -> io::Result<()> + Send + Sync + 'static,
    {
        Self::Handler(Arc::new(f))
    }

    /// Wraps a caller-defined renderer.
    pub fn custom(render: impl Render + 'static) -> Self {
        Self::Custom(Arc::new(render))
    }

    /// Adds a header, replacing existing values of the same name.
    pub fn with_header<K: IntoHeaderName>(self, name: K, value: HeaderValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        self.with_headers(headers)
    }

    /// Adds headers, replacing existing values of the same names.
    pub fn with_headers(self, headers: HeaderMap) -> Self {
        match self {
            Self::WithHeaders {
                parent,
                headers: inner,
            } => {
                // Inner headers are applied last, so they win on conflicts.
                let mut merged = headers;
                merge_headers(&mut merged, &inner);
                Self::WithHeaders {
                    parent,
                    headers: merged,
                }
            }
            other => Self::WithHeaders {
                parent: Box::new(other),
                headers,
            },
        }
    }

    /// Forces the status code of this response to `code`.
    pub fn override_status(self, code: StatusCode) -> Self {
        Self::OverrideStatus {
            parent: Box::new(self),
            code,
        }
    }
}

/// A delegate that answers `404 page not found`.
pub fn not_found_handler() -> impl Fn(&mut dyn ResponseSink, &Request) -> io::Result<()>
+ Send
+ Sync
+ 'static {
    |sink: &mut dyn ResponseSink, _: &Request| {
        write_plain_error(sink, StatusCode::NOT_FOUND, "404 page not found")
    }
}

#[async_trait]
impl Render for Response {
    async fn render(
        &self,
        sink: &mut dyn ResponseSink,
        request: &Request,
    ) -> Result<(), RenderError> {
        match self {
            Self::Status { code, message } => {
                if let Some(handler) = request.context().error_handler() {
                    let custom = handler(*code, message.as_str(), request);
                    // The handler's own status responses render as plain text.
                    let plain = request.with_context(request.context().without_error_handler());
                    return custom.render(sink, &plain).await;
                }
                Ok(write_plain_error(sink, *code, message)?)
            }
            Self::Bytes(data) => {
                if !sink.headers().contains_key(CONTENT_LENGTH) {
                    sink.headers_mut()
                        .insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
                }
                sink.write(data)?;
                Ok(())
            }
            Self::Json(data) => {
                if !sink.headers().contains_key(CONTENT_TYPE) {
                    sink.headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                sink.write(data)?;
                Ok(())
            }
            Self::File(path) => file::serve_file(sink, request, path).await,
            Self::Content {
                name,
                modified,
                data,
            } => file::serve_content(sink, request, name, *modified, data),
            Self::Redirect { code, location } => {
                let value = HeaderValue::try_from(location.as_str())?;
                sink.headers_mut().insert(LOCATION, value);
                sink.write_head(*code);
                Ok(())
            }
            Self::Handler(delegate) => Ok(delegate(sink, request)?),
            Self::WithHeaders { parent, headers } => {
                merge_headers(sink.headers_mut(), headers);
                parent.render(sink, request).await
            }
            Self::OverrideStatus { parent, code } => {
                let mut overridden = StatusOverride::new(sink, *code);
                parent.render(&mut overridden, request).await
            }
            Self::Custom(render) => render.render(sink, request).await,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { code, message } => f
                .debug_struct("Status")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Json(data) => f.debug_tuple("Json").field(&data.len()).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Content { name, data, .. } => f
                .debug_struct("Content")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
            Self::Redirect { code, location } => f
                .debug_struct("Redirect")
                .field("code", code)
                .field("location", location)
                .finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::WithHeaders { parent, headers } => f
                .debug_struct("WithHeaders")
                .field("parent", parent)
                .field("headers", headers)
                .finish(),
            Self::OverrideStatus { parent, code } => f
                .debug_struct("OverrideStatus")
                .field("parent", parent)
                .field("code", code)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Copies `from` into `into`, replacing every name that `from` sets.
fn merge_headers(into: &mut HeaderMap, from: &HeaderMap) {
    for name in from.keys() {
        into.remove(name);
        for value in from.get_all(name) {
            into.append(name.clone(), value.clone());
        }
    }
}

/// Writes `message` as a plain-text error body.
pub(crate) fn write_plain_error(
    sink: &mut dyn ResponseSink,
    code: StatusCode,
    message: &str,
) -> io::Result<()> {
    let headers = sink.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    sink.write_head(code);
    sink.write(format!("{message}\n").as_bytes())?;
    Ok(())
}
