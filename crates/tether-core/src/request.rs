//! The buffered request value seen by extractors, handlers and responses.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap};
use http::{Method, Uri, Version};

use crate::context::Context;

/// Path variables captured by a router, in route order.
///
/// Host adapters insert this into the `http::Request` extensions; it is then
/// picked up by [`Request::from_parts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(pub Vec<(String, String)>);

impl PathVars {
    /// Builds path variables from `(name, value)` pairs.
    pub fn new<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

struct Head {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

/// An incoming request with a fully buffered body.
///
/// Cloning is cheap: the head and the path variables are shared, the body is
/// reference counted.
#[derive(Clone)]
pub struct Request {
    head: Arc<Head>,
    body: Bytes,
    path_vars: Arc<[(String, String)]>,
    context: Context,
}

impl Request {
    /// Assembles a request from `http` parts and a collected body.
    pub fn from_parts(mut parts: http::request::Parts, body: Bytes) -> Self {
        let path_vars = parts
            .extensions
            .remove::<PathVars>()
            .map(|vars| vars.0)
            .unwrap_or_default();
        let context = parts.extensions.remove::<Context>().unwrap_or_default();

        Self {
            head: Arc::new(Head {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
            }),
            body,
            path_vars: path_vars.into(),
            context,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// The request target.
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// The protocol version.
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns a header value if it is present and valid UTF-8.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Path variables supplied by the router.
    pub fn path_vars(&self) -> &[(String, String)] {
        &self.path_vars
    }

    /// Looks up a single path variable.
    pub fn path_var(&self, name: &str) -> Option<&str> {
        self.path_vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decodes the query string into `(key, value)` pairs, preserving order and repeats.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.head
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The request context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns a copy of this request carrying `context`.
    pub fn with_context(&self, context: Context) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    /// Returns a copy of this request with an extra path variable, replacing
    /// an existing one of the same name.
    pub fn with_path_var(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let mut vars: Vec<_> = self
            .path_vars
            .iter()
            .filter(|(k, _)| *k != name)
            .cloned()
            .collect();
        vars.push((name, value.into()));
        Self {
            path_vars: vars.into(),
            ..self.clone()
        }
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .field("body_len", &self.body.len())
            .field("path_vars", &self.path_vars)
            .finish()
    }
}
