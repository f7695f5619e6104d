//! File and content serving with conditional-GET support.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED};
use http::{Method, StatusCode};
use tracing::debug;

use super::write_plain_error;
use crate::error::RenderError;
use crate::request::Request;
use crate::sink::ResponseSink;

pub(super) async fn serve_file(
    sink: &mut dyn ResponseSink,
    request: &Request,
    path: &Path,
) -> Result<(), RenderError> {
    if request.uri().path().split('/').any(|segment| segment == "..") {
        return Ok(write_plain_error(sink, StatusCode::BAD_REQUEST, "invalid URL path")?);
    }

    let mut path = PathBuf::from(path);
    let mut metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) => return write_io_error(sink, &path, &e),
    };
    if metadata.is_dir() {
        let index = path.join("index.html");
        match tokio::fs::metadata(&index).await {
            Ok(index_meta) if index_meta.is_file() => {
                path = index;
                metadata = index_meta;
            }
            _ => return Ok(write_plain_error(sink, StatusCode::FORBIDDEN, "403 Forbidden")?),
        }
    }

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) => return write_io_error(sink, &path, &e),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    serve_content(sink, request, name, metadata.modified().ok(), &Bytes::from(data))
}

pub(super) fn serve_content(
    sink: &mut dyn ResponseSink,
    request: &Request,
    name: &str,
    modified: Option<SystemTime>,
    data: &Bytes,
) -> Result<(), RenderError> {
    let modified = modified.filter(|m| *m > UNIX_EPOCH);

    if let Some(modified) = modified {
        let stamp = HeaderValue::from_str(&http_date(modified))?;
        if not_modified(request, modified) {
            let headers = sink.headers_mut();
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            headers.insert(LAST_MODIFIED, stamp);
            sink.write_head(StatusCode::NOT_MODIFIED);
            return Ok(());
        }
        sink.headers_mut().insert(LAST_MODIFIED, stamp);
    }

    if !sink.headers().contains_key(CONTENT_TYPE) {
        let content_type = content_type_for(name);
        sink.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
    }
    sink.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
    sink.write_head(StatusCode::OK);

    if request.method() != Method::HEAD {
        sink.write(data)?;
    }
    Ok(())
}

fn write_io_error(
    sink: &mut dyn ResponseSink,
    path: &Path,
    err: &io::Error,
) -> Result<(), RenderError> {
    debug!(path = %path.display(), error = %err, "cannot serve file");
    let (code, message) = match err.kind() {
        io::ErrorKind::NotFound => (StatusCode::NOT_FOUND, "404 page not found"),
        io::ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "403 Forbidden"),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "500 Internal Server Error",
        ),
    };
    Ok(write_plain_error(sink, code, message)?)
}

fn content_type_for(name: &str) -> String {
    match mime_guess::from_path(name).first_raw() {
        Some(mime) if mime.starts_with("text/") => format!("{mime}; charset=utf-8"),
        Some(mime) => mime.to_string(),
        None => "application/octet-stream".to_string(),
    }
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Whether `If-Modified-Since` allows a 304 for content last changed at `modified`.
fn not_modified(request: &Request, modified: SystemTime) -> bool {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return false;
    }
    let Some(since) = request
        .header(IF_MODIFIED_SINCE)
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
    else {
        return false;
    };
    let Ok(age) = modified.duration_since(UNIX_EPOCH) else {
        return false;
    };
    // HTTP dates have whole-second precision.
    i64::try_from(age.as_secs()).is_ok_and(|secs| secs <= since.timestamp())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::response::{Render, Response};
    use crate::sink::Recorder;

    fn get(uri: &str, if_modified_since: Option<&str>) -> Request {
        let mut builder = http::Request::get(uri);
        if let Some(since) = if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, since);
        }
        builder.body(Bytes::new()).map(Request::from).unwrap()
    }

    async fn render(response: Response, request: &Request) -> http::Response<Bytes> {
        let mut rec = Recorder::new();
        response.render(&mut rec, request).await.unwrap();
        rec.into_response()
    }

    #[test]
    fn test_http_date_format() {
        let time = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[tokio::test]
    async fn test_content_type_and_length() {
        let resp = render(
            Response::serve_content("notes.txt", None, "hello"),
            &get("/notes.txt", None),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(resp.headers()[CONTENT_LENGTH], "5");
        assert!(!resp.headers().contains_key(LAST_MODIFIED));
        assert_eq!(resp.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_if_modified_since_returns_304() {
        let modified = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let fresh = get("/a.json", Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        let resp = render(
            Response::serve_content("a.json", Some(modified), "{}"),
            &fresh,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(resp.body().is_empty());

        let stale = get("/a.json", Some("Sat, 05 Nov 1994 08:49:37 GMT"));
        let resp = render(
            Response::serve_content("a.json", Some(modified), "{}"),
            &stale,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[LAST_MODIFIED], "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let resp = render(
            Response::serve_file("/definitely/not/here.txt"),
            &get("/here.txt", None),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_ref(), b"404 page not found\n");
    }

    #[tokio::test]
    async fn test_serves_file_from_disk() {
        let dir = std::env::temp_dir().join(format!("tether-file-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("page.html");
        tokio::fs::write(&path, "<p>hi</p>").await.unwrap();
        tokio::fs::write(dir.join("index.html"), "<p>index</p>")
            .await
            .unwrap();

        let resp = render(Response::serve_file(&path), &get("/page.html", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(resp.headers().contains_key(LAST_MODIFIED));
        assert_eq!(resp.body().as_ref(), b"<p>hi</p>");

        let resp = render(Response::serve_file(&dir), &get("/", None)).await;
        assert_eq!(resp.body().as_ref(), b"<p>index</p>");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
