//! Options accepted by [`wrap`](crate::wrap).
//!
//! Each option edits the registries and settings of a single wrap call. The
//! registries start from their defaults on every call, so an option never
//! leaks into another handler.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use tether_core::{Context, ErrorHandler, Request, Response, ResponseWriter, Teardown};

use crate::extract::{ExtractConfig, Extractor, ExtractorRegistry};
use crate::reply::{ReturnHandler, ReturnRegistry};

/// Setup step run at the start of every request.
///
/// Returns the context the rest of the request sees, plus an optional
/// teardown run when the request is done.
pub type ContextWrapper = Arc<dyn Fn(Context) -> (Context, Option<Teardown>) + Send + Sync>;

/// Everything a wrap call is configured with.
#[derive(Clone, Default)]
pub struct WrapOptions {
    /// Parameter extractors.
    pub extractors: ExtractorRegistry,
    /// Return handlers.
    pub returns: ReturnRegistry,
    /// Context wrappers, in the order they run.
    pub wrappers: Vec<ContextWrapper>,
    /// Settings for the built-in extractors.
    pub extract: ExtractConfig,
}

impl WrapOptions {
    /// The built-in registries and no wrappers.
    pub fn defaults() -> Self {
        Self {
            extractors: ExtractorRegistry::defaults(),
            returns: ReturnRegistry::defaults(),
            wrappers: Vec::new(),
            extract: ExtractConfig::default(),
        }
    }

    /// Applies `options` in order.
    pub fn apply(mut self, options: impl IntoIterator<Item = WrapOption>) -> Self {
        for option in options {
            (option.0)(&mut self);
        }
        self
    }
}

impl fmt::Debug for WrapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapOptions")
            .field("extractors", &self.extractors)
            .field("returns", &self.returns)
            .field("wrappers", &self.wrappers.len())
            .field("extract", &self.extract)
            .finish()
    }
}

/// One configuration step for [`wrap`](crate::wrap).
pub struct WrapOption(Box<dyn FnOnce(&mut WrapOptions) + Send>);

impl WrapOption {
    /// An option from an arbitrary edit of the options.
    pub fn new(f: impl FnOnce(&mut WrapOptions) + Send + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl fmt::Debug for WrapOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WrapOption(..)")
    }
}

/// Teaches the wrapper to produce parameters of type `T`.
///
/// The function receives the response writer and the request, and returns
/// the value or a terminal response. It replaces any built-in way of
/// producing `T`.
///
/// ```rust,ignore
/// let show = wrap(show_user, [with_parameter_type(|_, req: Request| async move {
///     match req.header("x-user") {
///         Some(name) => Ok(User(name.to_owned())),
///         None => Err(Response::forbidden("who are you?")),
///     }
/// })]);
/// ```
pub fn with_parameter_type<T, F, Fut>(f: F) -> WrapOption
where
    T: Send + 'static,
    F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Response>> + Send + 'static,
{
    let extractor = Extractor::new(f);
    WrapOption::new(move |opts| opts.extractors.insert(extractor))
}

/// Teaches the wrapper to handle handler outputs of type `T`.
pub fn with_return_type<T, F, Fut>(f: F) -> WrapOption
where
    T: Send + 'static,
    F: Fn(ResponseWriter, Request, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handler = ReturnHandler::new(f);
    WrapOption::new(move |opts| opts.returns.insert(handler))
}

/// Runs `f` at the start of every request.
///
/// Wrappers run in the order they were added; their teardowns run in
/// reverse order once the response is written, even if the request failed
/// early or the handler panicked.
pub fn with_context_wrapper<F>(f: F) -> WrapOption
where
    F: Fn(Context) -> (Context, Option<Teardown>) + Send + Sync + 'static,
{
    let wrapper: ContextWrapper = Arc::new(f);
    WrapOption::new(move |opts| opts.wrappers.push(wrapper))
}

/// Renders every status/message response of the request through `f`.
pub fn with_error_handler<F>(f: F) -> WrapOption
where
    F: Fn(StatusCode, &str, &Request) -> Response + Send + Sync + 'static,
{
    let handler: ErrorHandler = Arc::new(f);
    with_context_wrapper(move |ctx: Context| (ctx.with_error_handler(handler.clone()), None))
}

/// Sets the largest multipart body accepted by `Post` parameters.
pub fn with_max_memory(bytes: u64) -> WrapOption {
    WrapOption::new(move |opts| opts.extract.max_memory = bytes)
}
