//! Parameter extraction.
//!
//! Every handler parameter is produced by an [`Extractor`]: an erased async
//! function from the live `(ResponseWriter, Request)` pair to either a value
//! or a terminal [`Response`]. Extractors are looked up once, when a handler
//! is wrapped:
//!
//! 1. an exact entry in the [`ExtractorRegistry`] for the parameter's type;
//! 2. otherwise the type's own [`Param::convention`].
//!
//! The built-in exact entries cover [`Context`], [`Request`] and
//! [`ResponseWriter`]. The conventions cover the decoding wrappers [`Get`],
//! [`Post`] and [`Json`].
//!
//! ```rust,ignore
//! #[derive(Deserialize, FormSchema)]
//! struct ArticleQuery {
//!     category: String,
//!     id: i64,
//! }
//!
//! async fn show(Get(query): Get<ArticleQuery>, ctx: Context) -> String {
//!     format!("{} #{}", query.category, query.id)
//! }
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::Method;
use serde::de::DeserializeOwned;
use tether_core::{Context, Request, Response, ResponseWriter};
use tracing::debug;

use crate::decode::{self, FormSchema};
use crate::error::DecodeError;

/// Default ceiling for a multipart form body, in bytes.
pub const DEFAULT_MAX_MEMORY: u64 = 32 << 20;

/// The erased output of an extractor.
pub type ExtractFuture = BoxFuture<'static, Result<Box<dyn Any + Send>, Response>>;

type ExtractFn = Arc<dyn Fn(ResponseWriter, Request) -> ExtractFuture + Send + Sync>;

/// Produces one handler argument per request, or a terminal response.
#[derive(Clone)]
pub struct Extractor {
    produces: TypeId,
    type_name: &'static str,
    f: ExtractFn,
}

impl Extractor {
    /// Wraps an async extraction function for values of type `T`.
    pub fn new<T, F, Fut>(f: F) -> Self
    where
        T: Send + 'static,
        F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Response>> + Send + 'static,
    {
        Self {
            produces: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            f: Arc::new(move |writer, request| {
                f(writer, request)
                    .map(|res| res.map(|value| Box::new(value) as Box<dyn Any + Send>))
                    .boxed()
            }),
        }
    }

    /// The type this extractor produces.
    pub fn produces(&self) -> TypeId {
        self.produces
    }

    /// Name of the produced type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Runs the extractor.
    pub fn extract(&self, writer: ResponseWriter, request: Request) -> ExtractFuture {
        (self.f)(writer, request)
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("produces", &self.type_name)
            .finish()
    }
}

/// Settings the built-in extractors read when they are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Largest multipart body accepted by [`Post`], in bytes.
    pub max_memory: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
        }
    }
}

/// A type that may appear as a handler parameter.
///
/// Implement it (or `#[derive(Param)]`) for your own types and register an
/// extractor with [`with_parameter_type`](crate::with_parameter_type). Types
/// that know how to extract themselves return an extractor from
/// [`convention`](Param::convention).
pub trait Param: Send + Sized + 'static {
    /// Fallback extractor used when the registry has no entry for this type.
    fn convention(config: &ExtractConfig) -> Option<Extractor> {
        let _ = config;
        None
    }
}

impl Param for Context {}
impl Param for Request {}
impl Param for ResponseWriter {}

/// Describes one handler parameter, captured when the handler is wrapped.
#[derive(Clone, Copy)]
pub struct ParamInfo {
    /// Type of the parameter.
    pub type_id: TypeId,
    /// Name of the parameter type.
    pub type_name: &'static str,
    convention: fn(&ExtractConfig) -> Option<Extractor>,
}

impl ParamInfo {
    /// Describes parameter type `T`.
    pub fn of<T: Param>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            convention: T::convention,
        }
    }
}

impl fmt::Debug for ParamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParamInfo").field(&self.type_name).finish()
    }
}

/// Extractors keyed by the type they produce.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    entries: HashMap<TypeId, Extractor>,
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in extractors.
    pub fn defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(Extractor::new(|_, request: Request| async move {
            Ok::<_, Response>(request.context().clone())
        }));
        registry.insert(Extractor::new(|_, request: Request| async move {
            Ok::<_, Response>(request)
        }));
        registry.insert(Extractor::new(|writer: ResponseWriter, _| async move {
            Ok::<_, Response>(writer)
        }));
        registry
    }

    /// Adds or replaces the extractor for the type it produces.
    pub fn insert(&mut self, extractor: Extractor) {
        self.entries.insert(extractor.produces, extractor);
    }

    /// Whether there is an exact entry for `type_id`.
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    /// Finds the extractor for `param`: the exact entry first, then the type's convention.
    pub fn resolve(&self, param: &ParamInfo, config: &ExtractConfig) -> Option<Extractor> {
        self.entries
            .get(&param.type_id)
            .cloned()
            .or_else(|| (param.convention)(config))
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.values().map(|e| e.type_name))
            .finish()
    }
}

fn bad_request(err: DecodeError) -> Response {
    debug!(error = %err, "request decoding failed");
    Response::bad_request(err.to_string())
}

macro_rules! wrapper_impls {
    ($name:ident<$t:ident> => $inner:ty) => {
        impl<$t> $name<$t> {
            /// Unwraps the decoded value.
            pub fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl<$t> Deref for $name<$t> {
            type Target = $inner;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$t> DerefMut for $name<$t> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

/// Decoded from the query string and the router's path variables.
///
/// Path variables win over query values of the same name. A decode failure
/// answers `400 Bad Request`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Get<T>(pub T);

wrapper_impls!(Get<T> => T);

impl<T> Param for Get<T>
where
    T: DeserializeOwned + FormSchema + Send + 'static,
{
    fn convention(_config: &ExtractConfig) -> Option<Extractor> {
        Some(Extractor::new(|_, request: Request| async move {
            decode::decode_get::<T>(&request).map(Get).map_err(bad_request)
        }))
    }
}

/// Decoded from a POST form body.
///
/// Holds `None` for any other method, without looking at the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post<T>(pub Option<T>);

wrapper_impls!(Post<T> => Option<T>);

impl<T> Param for Post<T>
where
    T: DeserializeOwned + FormSchema + Send + 'static,
{
    fn convention(config: &ExtractConfig) -> Option<Extractor> {
        let max_memory = config.max_memory;
        Some(Extractor::new(move |_, request: Request| async move {
            if request.method() != Method::POST {
                return Ok(Post(None));
            }
            decode::decode_post::<T>(&request, max_memory)
                .await
                .map(|value| Post(Some(value)))
                .map_err(bad_request)
        }))
    }
}

/// Decoded from a JSON request body.
///
/// An empty or malformed body answers `400 Bad Request`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

wrapper_impls!(Json<T> => T);

impl<T> Param for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn convention(_config: &ExtractConfig) -> Option<Extractor> {
        Some(Extractor::new(|_, request: Request| async move {
            decode::decode_json::<T>(&request).map(Json).map_err(bad_request)
        }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Query {
        category: String,
        id: i64,
    }

    impl FormSchema for Query {}

    struct Unknown;

    impl Param for Unknown {}

    fn request(method: Method, uri: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(
                http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Bytes::from_static(body.as_bytes()))
            .map(Request::from)
            .unwrap()
    }

    async fn run<T: Param>(registry: &ExtractorRegistry, request: Request) -> Result<T, Response> {
        let extractor = registry
            .resolve(&ParamInfo::of::<T>(), &ExtractConfig::default())
            .unwrap();
        let value = extractor
            .extract(ResponseWriter::recorder(), request)
            .await?;
        Ok(*value.downcast::<T>().unwrap())
    }

    #[test]
    fn test_resolution_order() {
        let registry = ExtractorRegistry::defaults();
        let config = ExtractConfig::default();
        assert!(registry.contains(TypeId::of::<Context>()));
        assert!(registry.resolve(&ParamInfo::of::<Request>(), &config).is_some());
        assert!(registry.resolve(&ParamInfo::of::<Get<Query>>(), &config).is_some());
        assert!(registry.resolve(&ParamInfo::of::<Unknown>(), &config).is_none());

        let mut custom = registry.clone();
        custom.insert(Extractor::new(|_, _| async { Ok::<_, Response>(Unknown) }));
        assert!(custom.resolve(&ParamInfo::of::<Unknown>(), &config).is_some());
        assert!(registry.resolve(&ParamInfo::of::<Unknown>(), &config).is_none());
    }

    #[tokio::test]
    async fn test_get_extracts_query() {
        let registry = ExtractorRegistry::defaults();
        let Get(query) = run::<Get<Query>>(
            &registry,
            request(Method::GET, "/?category=test&id=7", ""),
        )
        .await
        .unwrap();
        assert_eq!(
            query,
            Query {
                category: "test".into(),
                id: 7
            }
        );
    }

    #[tokio::test]
    async fn test_get_failure_is_bad_request() {
        let registry = ExtractorRegistry::defaults();
        let err = run::<Get<Query>>(&registry, request(Method::GET, "/?id=x", ""))
            .await
            .unwrap_err();
        match err {
            Response::Status { code, message } => {
                assert_eq!(code, StatusCode::BAD_REQUEST);
                assert!(message.starts_with("failed to parse url/query: "));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_is_none_for_other_methods() {
        let registry = ExtractorRegistry::defaults();
        let post = run::<Post<Query>>(&registry, request(Method::GET, "/", "id=not-a-number"))
            .await
            .unwrap();
        assert!(post.is_none());

        let post = run::<Post<Query>>(
            &registry,
            request(Method::POST, "/", "category=a&id=2"),
        )
        .await
        .unwrap();
        assert_eq!(post.into_inner().map(|q| q.id), Some(2));
    }

    #[tokio::test]
    async fn test_json_extracts_body() {
        #[derive(Debug, Deserialize)]
        struct Body {
            newname: String,
        }

        let registry = ExtractorRegistry::defaults();
        let json = run::<Json<Body>>(
            &registry,
            request(Method::POST, "/", "{\"newname\":\"dude\"}"),
        )
        .await
        .unwrap();
        assert_eq!(json.newname, "dude");
    }
}
