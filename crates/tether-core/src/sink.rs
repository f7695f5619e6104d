//! Output sinks.
//!
//! A [`ResponseSink`] is the low-level surface a response is rendered onto:
//! a header map, a status line that can be written once, and a body. The
//! [`Recorder`] buffers everything in memory and is what host adapters (and
//! tests) use. [`ResponseWriter`] is the shareable handle handed to handlers
//! that ask for the raw sink.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::request::Request;
use crate::response::{Render, Response};

/// A destination for one response.
pub trait ResponseSink: Send {
    /// Headers that will be sent with the status line.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the pending headers.
    ///
    /// Changes made after the status line was written have no effect.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Writes the status line. Only the first call has an effect.
    fn write_head(&mut self, status: StatusCode);

    /// Appends to the body, writing a `200 OK` status line first if none was written.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// The status written so far, if any.
    fn status(&self) -> Option<StatusCode>;

    /// Takes the buffered response out of a recording sink.
    ///
    /// Streaming sinks return `None`.
    fn take_recording(&mut self) -> Option<http::Response<Bytes>> {
        None
    }
}

/// Whether a status permits a response body.
pub fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// An in-memory sink.
#[derive(Debug, Default)]
pub struct Recorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    /// Headers as they were when the status line was written.
    sent_headers: Option<HeaderMap>,
    body: BytesMut,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded status, `200 OK` if nothing was written.
    pub fn code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// The recorded body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts the recording into an `http::Response`.
    pub fn into_response(mut self) -> http::Response<Bytes> {
        self.finish()
    }

    fn finish(&mut self) -> http::Response<Bytes> {
        let status = self.code();
        let headers = self
            .sent_headers
            .take()
            .unwrap_or_else(|| std::mem::take(&mut self.headers));
        let mut response = http::Response::new(std::mem::take(&mut self.body).freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        self.status = None;
        response
    }
}

impl ResponseSink for Recorder {
    fn headers(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some(existing) = self.status {
            debug!(%existing, ignored = %status, "superfluous write_head call");
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
        if !body_allowed(self.code()) {
            trace!(status = %self.code(), len = data.len(), "discarding body for bodiless status");
            return Ok(data.len());
        }
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn take_recording(&mut self) -> Option<http::Response<Bytes>> {
        Some(self.finish())
    }
}

/// A sink wrapper that forces every status line to `status`.
pub struct StatusOverride<'a> {
    inner: &'a mut dyn ResponseSink,
    status: StatusCode,
}

impl<'a> StatusOverride<'a> {
    /// Wraps `inner`.
    pub fn new(inner: &'a mut dyn ResponseSink, status: StatusCode) -> Self {
        Self { inner, status }
    }
}

impl ResponseSink for StatusOverride<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, _status: StatusCode) {
        self.inner.write_head(self.status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.inner.status().is_none() {
            self.inner.write_head(self.status);
        }
        self.inner.write(data)
    }

    fn status(&self) -> Option<StatusCode> {
        self.inner.status()
    }
}

/// Shared handle to the sink of the request being served.
///
/// This is what a handler receives when it asks for the raw response sink.
#[derive(Clone)]
pub struct ResponseWriter {
    sink: Arc<Mutex<Box<dyn ResponseSink>>>,
}

impl ResponseWriter {
    /// Wraps a sink.
    pub fn new(sink: impl ResponseSink + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// A writer backed by a fresh [`Recorder`].
    pub fn recorder() -> Self {
        Self::new(Recorder::new())
    }

    /// Locks the sink for direct access.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn ResponseSink>> {
        self.sink.lock().await
    }

    /// Sets a header, replacing existing values.
    pub async fn set_header(&self, name: http::HeaderName, value: http::HeaderValue) {
        self.lock().await.headers_mut().insert(name, value);
    }

    /// Writes the status line.
    pub async fn write_head(&self, status: StatusCode) {
        self.lock().await.write_head(status);
    }

    /// Appends to the body.
    pub async fn write(&self, data: impl AsRef<[u8]>) -> io::Result<usize> {
        self.lock().await.write(data.as_ref())
    }

    /// Renders `response` onto the sink, logging failures.
    pub async fn respond(&self, request: &Request, response: &Response) {
        let mut sink = self.lock().await;
        if let Err(e) = response.render(&mut **sink, request).await {
            tracing::error!(error = %e, "failed to respond to request");
        }
    }

    /// Takes the recording if the sink is a recorder.
    pub async fn take_recording(&self) -> Option<http::Response<Bytes>> {
        self.lock().await.take_recording()
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use http::header::CONTENT_TYPE;

    use super::*;

    #[test]
    fn test_write_implies_ok() {
        let mut rec = Recorder::new();
        rec.write(b"hello").unwrap();
        let resp = rec.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body().as_ref(), b"hello");
    }

    #[test]
    fn test_second_write_head_is_ignored() {
        let mut rec = Recorder::new();
        rec.write_head(StatusCode::CREATED);
        rec.write_head(StatusCode::BAD_GATEWAY);
        assert_eq!(rec.code(), StatusCode::CREATED);
    }

    #[test]
    fn test_headers_freeze_at_write_head() {
        let mut rec = Recorder::new();
        rec.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        rec.write_head(StatusCode::OK);
        rec.headers_mut()
            .insert("x-late", HeaderValue::from_static("1"));

        let resp = rec.into_response();
        assert!(resp.headers().contains_key(CONTENT_TYPE));
        assert!(!resp.headers().contains_key("x-late"));
    }

    #[test]
    fn test_no_content_drops_body() {
        let mut rec = Recorder::new();
        rec.write_head(StatusCode::NO_CONTENT);
        rec.write(b"\n").unwrap();
        assert!(rec.body().is_empty());
    }

    #[test]
    fn test_status_override_forces_code() {
        let mut rec = Recorder::new();
        {
            let mut sink = StatusOverride::new(&mut rec, StatusCode::NOT_ACCEPTABLE);
            sink.write_head(StatusCode::NOT_FOUND);
            sink.write(b"body").unwrap();
        }
        assert_eq!(rec.code(), StatusCode::NOT_ACCEPTABLE);

        let mut rec = Recorder::new();
        StatusOverride::new(&mut rec, StatusCode::ACCEPTED)
            .write(b"x")
            .unwrap();
        assert_eq!(rec.code(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_writer_take_recording() {
        let writer = ResponseWriter::recorder();
        writer.write_head(StatusCode::IM_A_TEAPOT).await;
        writer.write("short and stout").await.unwrap();

        let resp = writer.take_recording().await.unwrap();
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(resp.body().as_ref(), b"short and stout");
    }
}
