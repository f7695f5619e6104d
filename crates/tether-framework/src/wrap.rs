//! Turning handlers into request pipelines.
//!
//! [`wrap`] inspects a handler's signature once and freezes the result into a
//! [`Wrapped`] value. Serving a request then only runs the prebuilt steps:
//!
//! 1. context wrappers, in order, collecting teardowns;
//! 2. extractors, in parameter order, stopping at the first terminal response;
//! 3. the handler;
//! 4. the return handler;
//! 5. teardowns, in reverse order.

use std::any::{Any, type_name};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use tether_core::{Request, Response, ResponseWriter, Teardown};
use tracing::{Instrument, debug, debug_span, error, trace};

use crate::error::{ArgumentMismatch, WrapError};
use crate::extract::Extractor;
use crate::handler::Handler;
use crate::options::{ContextWrapper, WrapOption, WrapOptions};

type CallFn = Box<
    dyn Fn(ResponseWriter, Request, Vec<Box<dyn Any + Send>>) -> BoxFuture<'static, Result<(), ArgumentMismatch>>
        + Send
        + Sync,
>;

struct Plan {
    handler: &'static str,
    wrappers: Vec<ContextWrapper>,
    extractors: Vec<Extractor>,
    call: CallFn,
}

/// A handler bound to its extraction and reply steps.
///
/// Cheap to clone; clones share the same plan.
#[derive(Clone)]
pub struct Wrapped {
    plan: Arc<Plan>,
}

/// Wraps `handler`, or reports why its signature cannot be served.
pub fn try_wrap<H, Args>(
    handler: H,
    options: impl IntoIterator<Item = WrapOption>,
) -> Result<Wrapped, WrapError>
where
    H: Handler<Args>,
{
    let name = type_name::<H>();
    let WrapOptions {
        extractors: registry,
        returns,
        wrappers,
        extract,
    } = WrapOptions::defaults().apply(options);

    let extractors = H::parameters()
        .iter()
        .enumerate()
        .map(|(index, param)| {
            registry
                .resolve(param, &extract)
                .ok_or(WrapError::UnknownParameter {
                    handler: name,
                    index,
                    type_name: param.type_name,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let reply = returns
        .resolve::<H::Output>()
        .ok_or(WrapError::UnknownReturn {
            handler: name,
            type_name: type_name::<H::Output>(),
        })?;

    debug!(
        handler = name,
        parameters = extractors.len(),
        wrappers = wrappers.len(),
        "wrapped handler"
    );

    let call: CallFn = Box::new(move |writer, request, args| {
        let output = handler.invoke(args);
        let reply = reply.clone();
        async move {
            let output = output?.await;
            reply.handle(writer, request, Box::new(output)).await;
            Ok(())
        }
        .boxed()
    });

    Ok(Wrapped {
        plan: Arc::new(Plan {
            handler: name,
            wrappers,
            extractors,
            call,
        }),
    })
}

/// Wraps `handler` with `options`.
///
/// # Panics
///
/// Panics if a parameter or the return type of `handler` has no registered
/// handling. This is a programming error and surfaces when the route is
/// built, never while serving. Use [`try_wrap`] to handle it yourself.
pub fn wrap<H, Args>(handler: H, options: impl IntoIterator<Item = WrapOption>) -> Wrapped
where
    H: Handler<Args>,
{
    match try_wrap(handler, options) {
        Ok(wrapped) => wrapped,
        Err(e) => panic!("{e}"),
    }
}

/// Teardowns of one request, run in reverse order when dropped.
#[derive(Default)]
struct TeardownStack(Vec<Teardown>);

impl Drop for TeardownStack {
    fn drop(&mut self) {
        while let Some(teardown) = self.0.pop() {
            teardown();
        }
    }
}

impl Wrapped {
    /// Type name of the wrapped handler.
    pub fn handler_name(&self) -> &'static str {
        self.plan.handler
    }

    /// Serves `request`, writing the response through `writer`.
    pub async fn serve(&self, writer: ResponseWriter, request: Request) {
        let plan = &self.plan;
        let span = debug_span!(
            "serve",
            handler = plan.handler,
            method = %request.method(),
            path = request.uri().path(),
        );

        async move {
            let mut teardowns = TeardownStack::default();
            let mut request = request;

            if !plan.wrappers.is_empty() {
                let mut ctx = request.context().clone();
                for wrapper in &plan.wrappers {
                    let (next, teardown) = wrapper(ctx);
                    ctx = next;
                    teardowns.0.extend(teardown);
                }
                request = request.with_context(ctx);
            }

            let mut args = Vec::with_capacity(plan.extractors.len());
            for (index, extractor) in plan.extractors.iter().enumerate() {
                match extractor.extract(writer.clone(), request.clone()).await {
                    Ok(arg) => args.push(arg),
                    Err(response) => {
                        debug!(
                            index,
                            parameter = extractor.type_name(),
                            "extraction short-circuited"
                        );
                        writer.respond(&request, &response).await;
                        return;
                    }
                }
            }

            trace!("invoking handler");
            if let Err(e) = (plan.call)(writer.clone(), request.clone(), args).await {
                error!(error = %e, "handler invocation failed");
                writer.respond(&request, &Response::error(e)).await;
            }
            drop(teardowns);
        }
        .instrument(span)
        .await
    }

    /// Serves `request` into an in-memory recorder and returns the result.
    ///
    /// A panic while serving is logged and answered with `500` if no status
    /// line was written yet.
    pub async fn handle(&self, request: Request) -> http::Response<Bytes> {
        let writer = ResponseWriter::recorder();
        let outcome = AssertUnwindSafe(self.serve(writer.clone(), request.clone()))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            error!(
                handler = self.plan.handler,
                panic = panic_message(panic.as_ref()),
                "handler panicked"
            );
            let written = writer.lock().await.status().is_some();
            if !written {
                let response = Response::internal_server_error("Internal Server Error");
                writer.respond(&request, &response).await;
            }
        }

        writer.take_recording().await.unwrap_or_else(|| {
            let mut response = http::Response::new(Bytes::new());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl fmt::Debug for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapped")
            .field("handler", &self.plan.handler)
            .field("parameters", &self.plan.extractors)
            .field("wrappers", &self.plan.wrappers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use tether_core::Context;

    use super::*;
    use crate::decode::FormSchema;
    use crate::extract::Get;
    use crate::options::{with_context_wrapper, with_parameter_type};

    struct Unknown;

    impl crate::extract::Param for Unknown {}

    fn request() -> Request {
        http::Request::get("/")
            .body(Bytes::new())
            .map(Request::from)
            .unwrap()
    }

    #[test]
    fn test_unknown_parameter_is_reported() {
        let err = try_wrap(|_: Context, _: Unknown| async {}, []).unwrap_err();
        match err {
            WrapError::UnknownParameter {
                index, type_name, ..
            } => {
                assert_eq!(index, 1);
                assert!(type_name.ends_with("Unknown"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    #[should_panic(expected = "don't know how to handle return type")]
    fn test_wrap_panics_on_unknown_return() {
        struct Weird;
        impl crate::reply::Reply for Weird {}

        wrap(|| async { Weird }, []);
    }

    #[tokio::test]
    async fn test_teardowns_run_in_reverse_after_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let wrapper = |name: &'static str| {
            let log = log.clone();
            with_context_wrapper(move |ctx: Context| {
                log.lock().unwrap().push(format!("setup {name}"));
                let log = log.clone();
                let teardown: Teardown =
                    Box::new(move || log.lock().unwrap().push(format!("teardown {name}")));
                (ctx, Some(teardown))
            })
        };
        let handler_log = log.clone();
        let wrapped = wrap(
            move || {
                let log = handler_log.clone();
                async move { log.lock().unwrap().push("handler".to_string()) }
            },
            [wrapper("a"), wrapper("b")],
        );

        wrapped.handle(request()).await;
        assert_eq!(
            *log.lock().unwrap(),
            ["setup a", "setup b", "handler", "teardown b", "teardown a"]
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_500_and_tears_down() {
        let torn_down = Arc::new(Mutex::new(false));
        let flag = torn_down.clone();
        let wrapped = wrap(
            || async {
                if true {
                    panic!("kaboom");
                }
            },
            [with_context_wrapper(move |ctx: Context| {
                let flag = flag.clone();
                let teardown: Teardown = Box::new(move || *flag.lock().unwrap() = true);
                (ctx, Some(teardown))
            })],
        );

        let resp = wrapped.handle(request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(*torn_down.lock().unwrap());
    }

    #[derive(Debug, Deserialize)]
    struct Lookup {
        id: i64,
    }

    impl FormSchema for Lookup {}

    struct Audit;

    impl crate::extract::Param for Audit {}

    #[tokio::test]
    async fn test_failed_extraction_stops_before_later_params() {
        let audits = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let teardowns = Arc::new(AtomicUsize::new(0));

        let counter = audits.clone();
        let handler_calls = calls.clone();
        let torn_down = teardowns.clone();
        let wrapped = wrap(
            move |Get(lookup): Get<Lookup>, _: Audit| {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                async move { lookup.id.to_string() }
            },
            [
                with_parameter_type(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, Response>(Audit) }
                }),
                with_context_wrapper(move |ctx: Context| {
                    let torn_down = torn_down.clone();
                    let teardown: Teardown = Box::new(move || {
                        torn_down.fetch_add(1, Ordering::SeqCst);
                    });
                    (ctx, Some(teardown))
                }),
            ],
        );

        let req = http::Request::get("/?id=seven")
            .body(Bytes::new())
            .map(Request::from)
            .unwrap();
        let resp = wrapped.handle(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(audits.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }
}
