//! `tower::Service` adapter for [`Wrapped`] handlers.
//!
//! Lets a wrapped handler be mounted in any tower-based HTTP server. The
//! request body is collected up front; path variables are taken from a
//! [`PathVars`](tether_core::PathVars) request extension if the router put one there.

use std::convert::Infallible;
use std::fmt;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tether_core::Request;
use tower::Service;
use tracing::warn;

use crate::wrap::Wrapped;

impl<B> Service<http::Request<B>> for Wrapped
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display + Send,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let wrapped = self.clone();
        async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(error = %e, "failed to read request body");
                    return Ok(unreadable_body());
                }
            };
            let response = wrapped.handle(Request::from_parts(parts, body)).await;
            Ok(response.map(Full::new))
        }
        .boxed()
    }
}

fn unreadable_body() -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from_static(
        b"failed to read request body\n",
    )));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use tether_core::PathVars;
    use tower::ServiceExt;

    use super::*;
    use crate::wrap::wrap;

    #[test]
    fn test_always_ready() {
        let mut wrapped = wrap(|| async {}, []);
        let mut task = tokio_test::task::spawn(());
        tokio_test::assert_ready_ok!(task.enter(|cx, _| {
            Service::<http::Request<Full<Bytes>>>::poll_ready(&mut wrapped, cx)
        }));
    }

    #[tokio::test]
    async fn test_oneshot_reads_body_and_path_vars() {
        let wrapped = wrap(
            |req: Request| async move {
                format!(
                    "{} {}",
                    req.path_var("id").unwrap_or("-"),
                    String::from_utf8_lossy(req.body())
                )
            },
            [],
        );

        let mut req = http::Request::post("/articles/7")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();
        req.extensions_mut().insert(PathVars::new([("id", "7")]));

        let resp = wrapped.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"7 payload");
    }
}
