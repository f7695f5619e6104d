//! Serving wrapped handlers over HTTP with axum.
//!
//! axum does the routing and connection handling; each route forwards to a
//! [`Wrapped`] handler through its `tower::Service` implementation, passing
//! the matched path parameters along as [`PathVars`].
//!
//! ```rust,ignore
//! use tether_runtime::{Server, config::load_config};
//!
//! let config = load_config()?;
//! Server::from_config(&config)
//!     .handle("/articles/{category}/{id}", article, [])
//!     .serve()
//!     .await?;
//! ```

use std::future::Future;

use axum::Router;
use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request as AxumRequest};
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::any;
use http_body_util::Limited;
use tether_core::PathVars;
use tether_framework::{Handler, WrapOption, Wrapped, with_max_memory, wrap};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, TetherConfig};
use crate::error::{ServerError, ServerResult};

/// An HTTP server routing paths to wrapped handlers.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    router: Router,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Server {
    /// Creates a server with no routes.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Creates a server from the `server` section of a loaded configuration.
    pub fn from_config(config: &TetherConfig) -> Self {
        Self::new(config.server.clone())
    }

    /// The server settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Wraps `handler` with the server's multipart limit applied first, so
    /// `options` can still override it.
    ///
    /// # Panics
    ///
    /// Panics like [`wrap`] when a parameter or the return type is unsupported.
    pub fn wrap<H, Args>(
        &self,
        handler: H,
        options: impl IntoIterator<Item = WrapOption>,
    ) -> Wrapped
    where
        H: Handler<Args>,
    {
        let limit = with_max_memory(self.config.max_multipart_memory);
        wrap(handler, std::iter::once(limit).chain(options))
    }

    /// Routes every method on `path` to an already wrapped handler.
    ///
    /// Paths use axum syntax: `/articles/{category}/{id}`.
    pub fn route(mut self, path: &str, wrapped: Wrapped) -> Self {
        debug!(path, handler = wrapped.handler_name(), "Registering route");
        let max_body_size = self.config.max_body_size;
        let endpoint = any(
            move |params: Result<RawPathParams, RawPathParamsRejection>, req: AxumRequest| {
                dispatch(wrapped.clone(), max_body_size, params, req)
            },
        );
        self.router = self.router.route(path, endpoint);
        self
    }

    /// Wraps `handler` and routes `path` to it.
    ///
    /// # Panics
    ///
    /// Panics when the handler cannot be wrapped.
    pub fn handle<H, Args>(
        self,
        path: &str,
        handler: H,
        options: impl IntoIterator<Item = WrapOption>,
    ) -> Self
    where
        H: Handler<Args>,
    {
        let wrapped = self.wrap(handler, options);
        self.route(path, wrapped)
    }

    /// The axum router, for mounting under a larger application.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Binds the configured address and serves until Ctrl+C.
    pub async fn serve(self) -> ServerResult<()> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` completes, then drains open requests.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().map_err(ServerError::Serve)?;
        info!(address = %local, "Server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(ServerError::Serve)?;

        info!("Server stopped");
        Ok(())
    }
}

async fn dispatch(
    wrapped: Wrapped,
    max_body_size: u64,
    params: Result<RawPathParams, RawPathParamsRejection>,
    req: AxumRequest,
) -> AxumResponse {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > max_body_size) {
        debug!(max_body_size, "Rejecting oversized request body");
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n").into_response();
    }

    let vars = match params {
        Ok(params) => PathVars::new(&params),
        Err(rejection) => {
            warn!(error = %rejection, "Path parameters unavailable");
            PathVars::default()
        }
    };

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let mut req = req.map(|body| Limited::new(body, limit));
    req.extensions_mut().insert(vars);

    match wrapped.oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C, shutting down");
        return;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, Request as HttpRequest};
    use http_body_util::BodyExt;
    use tether_core::{Request, Response};

    use super::*;

    async fn send(router: Router, req: HttpRequest<Body>) -> (StatusCode, String) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn echo_server(config: ServerConfig) -> Server {
        Server::new(config).handle(
            "/items/{category}/{id}",
            |req: Request| async move {
                Response::format(format_args!(
                    "{}/{} {}",
                    req.path_var("category").unwrap_or(""),
                    req.path_var("id").unwrap_or(""),
                    req.body().len()
                ))
            },
            [],
        )
    }

    #[tokio::test]
    async fn test_route_passes_path_vars() {
        let server = echo_server(ServerConfig::default());
        let req = HttpRequest::get("/items/news/7").body(Body::empty()).unwrap();
        let (status, body) = send(server.router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "news/7 0");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let config = ServerConfig {
            max_body_size: 4,
            max_multipart_memory: 4,
            ..ServerConfig::default()
        };
        let server = echo_server(config);
        let req = HttpRequest::builder()
            .method(Method::POST)
            .uri("/items/a/b")
            .header(CONTENT_LENGTH, "10")
            .body(Body::from("0123456789"))
            .unwrap();
        let (status, _) = send(server.router(), req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let server = echo_server(ServerConfig::default());
        let req = HttpRequest::get("/other").body(Body::empty()).unwrap();
        let (status, _) = send(server.router(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = echo_server(ServerConfig::default());
        let result = server.serve_with_shutdown(listener, async {}).await;
        assert!(result.is_ok());
    }
}
