//! Return value handling.
//!
//! The output of a handler is passed to a [`ReturnHandler`], which turns it
//! into an effect on the response sink. As with parameters, the handler is
//! looked up once when wrapping: an exact [`ReturnRegistry`] entry first,
//! then the type's [`Reply::convention`].
//!
//! | Output | Effect |
//! |---|---|
//! | `()` | nothing |
//! | [`Response`] | rendered |
//! | `String` | written as the body |
//! | `Option<T>` | `None` does nothing, `Some` is handled as `T` |
//! | `Result<T, E>` | `Err` renders a `500` with the error text, `Ok` is handled as `T` |

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tether_core::{Request, Response, ResponseWriter};
use tracing::error;

type ReplyFn =
    Arc<dyn Fn(ResponseWriter, Request, Box<dyn Any + Send>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Writes one kind of handler output onto the response.
#[derive(Clone)]
pub struct ReturnHandler {
    handles: TypeId,
    type_name: &'static str,
    f: ReplyFn,
}

impl ReturnHandler {
    /// Wraps an async function handling outputs of type `T`.
    pub fn new<T, F, Fut>(f: F) -> Self
    where
        T: Send + 'static,
        F: Fn(ResponseWriter, Request, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handles: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            f: Arc::new(move |writer, request, value| match value.downcast::<T>() {
                Ok(value) => f(writer, request, *value).boxed(),
                Err(_) => {
                    error!(expected = type_name::<T>(), "return value has unexpected type");
                    future::ready(()).boxed()
                }
            }),
        }
    }

    /// The output type this handler accepts.
    pub fn handles(&self) -> TypeId {
        self.handles
    }

    /// Name of the handled type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Handles an erased output value.
    pub fn handle(
        &self,
        writer: ResponseWriter,
        request: Request,
        value: Box<dyn Any + Send>,
    ) -> BoxFuture<'static, ()> {
        (self.f)(writer, request, value)
    }
}

impl fmt::Debug for ReturnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnHandler")
            .field("handles", &self.type_name)
            .finish()
    }
}

/// A type a handler may return.
///
/// Implement it (or `#[derive(Reply)]`) for your own types and register a
/// handler with [`with_return_type`](crate::with_return_type).
pub trait Reply: Send + Sized + 'static {
    /// Fallback handler used when the registry has no entry for this type.
    fn convention(returns: &ReturnRegistry) -> Option<ReturnHandler> {
        let _ = returns;
        None
    }
}

impl Reply for Response {}

impl Reply for () {
    fn convention(_returns: &ReturnRegistry) -> Option<ReturnHandler> {
        Some(ReturnHandler::new(|_, _, ()| future::ready(())))
    }
}

impl Reply for String {
    fn convention(_returns: &ReturnRegistry) -> Option<ReturnHandler> {
        Some(ReturnHandler::new(
            |writer: ResponseWriter, request: Request, body: String| async move {
                writer.respond(&request, &Response::string(body)).await;
            },
        ))
    }
}

impl Reply for Bytes {
    fn convention(_returns: &ReturnRegistry) -> Option<ReturnHandler> {
        Some(ReturnHandler::new(
            |writer: ResponseWriter, request: Request, body: Bytes| async move {
                writer.respond(&request, &Response::bytes(body)).await;
            },
        ))
    }
}

impl<T: Reply> Reply for Option<T> {
    fn convention(returns: &ReturnRegistry) -> Option<ReturnHandler> {
        let inner = returns.resolve::<T>()?;
        Some(ReturnHandler::new(
            move |writer: ResponseWriter, request: Request, value: Option<T>| {
                let inner = inner.clone();
                async move {
                    if let Some(value) = value {
                        inner.handle(writer, request, Box::new(value)).await;
                    }
                }
            },
        ))
    }
}

impl<T, E> Reply for Result<T, E>
where
    T: Reply,
    E: fmt::Display + Send + 'static,
{
    fn convention(returns: &ReturnRegistry) -> Option<ReturnHandler> {
        let inner = returns.resolve::<T>()?;
        Some(ReturnHandler::new(
            move |writer: ResponseWriter, request: Request, value: Result<T, E>| {
                let inner = inner.clone();
                async move {
                    match value {
                        Ok(value) => inner.handle(writer, request, Box::new(value)).await,
                        Err(e) => writer.respond(&request, &Response::error(e)).await,
                    }
                }
            },
        ))
    }
}

/// Return handlers keyed by the type they accept.
#[derive(Clone, Default)]
pub struct ReturnRegistry {
    entries: HashMap<TypeId, ReturnHandler>,
}

impl ReturnRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in handlers.
    pub fn defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(ReturnHandler::new(
            |writer: ResponseWriter, request: Request, response: Response| async move {
                writer.respond(&request, &response).await;
            },
        ));
        registry
    }

    /// Adds or replaces the handler for the type it accepts.
    pub fn insert(&mut self, handler: ReturnHandler) {
        self.entries.insert(handler.handles, handler);
    }

    /// Finds the handler for `T`: the exact entry first, then the type's convention.
    pub fn resolve<T: Reply>(&self) -> Option<ReturnHandler> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .or_else(|| T::convention(self))
    }
}

impl fmt::Debug for ReturnRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.values().map(|h| h.type_name))
            .finish()
    }
}
