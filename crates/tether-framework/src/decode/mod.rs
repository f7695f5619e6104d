//! Request decoders behind the `Get`, `Post` and `Json` parameters.
//!
//! Each decoder reads a buffered [`Request`] and fails with a [`DecodeError`]
//! whose text is what the client sees in the `400 Bad Request` body.

pub mod form;

use bytes::Bytes;
use futures::stream;
use serde::de::DeserializeOwned;
use tether_core::Request;
use tracing::trace;

pub use form::{FormSchema, FormValues};

use crate::error::{DecodeError, DecodeResult};

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Decodes the query string and path variables of `request` into `T`.
///
/// Path variables replace query values of the same name.
pub fn decode_get<T>(request: &Request) -> DecodeResult<T>
where
    T: DeserializeOwned + FormSchema,
{
    let query = request.uri().query().unwrap_or_default();
    let mut values =
        FormValues::parse_urlencoded(query.as_bytes()).map_err(DecodeError::Query)?;
    for (name, value) in request.path_vars() {
        values.set(name.as_str(), value.as_str());
    }
    form::decode(&values).map_err(DecodeError::Query)
}

/// Decodes the form body of `request` into `T`.
///
/// URL-encoded and multipart bodies are understood; a multipart body may not
/// exceed `max_memory` bytes. Any other content type decodes as an empty form.
pub async fn decode_post<T>(request: &Request, max_memory: u64) -> DecodeResult<T>
where
    T: DeserializeOwned + FormSchema,
{
    let values = post_values(request, max_memory).await?;
    form::decode(&values).map_err(DecodeError::Form)
}

/// Reads the POST form values of `request`.
pub async fn post_values(request: &Request, max_memory: u64) -> DecodeResult<FormValues> {
    let content_type = request.content_type().unwrap_or_default();
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        URLENCODED => FormValues::parse_urlencoded(request.body()).map_err(DecodeError::Form),
        MULTIPART => multipart_values(content_type, request.body().clone(), max_memory).await,
        _ => {
            trace!(content_type, "not a form body, decoding as empty form");
            Ok(FormValues::new())
        }
    }
}

async fn multipart_values(
    content_type: &str,
    body: Bytes,
    max_memory: u64,
) -> DecodeResult<FormValues> {
    let boundary = multer::parse_boundary(content_type)?;
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(max_memory));
    let body = stream::once(async move { Ok::<_, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::with_constraints(body, boundary, constraints);

    let mut values = FormValues::new();
    while let Some(field) = multipart.next_field().await? {
        // Uploaded files are not form values.
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let text = field.text().await?;
        values.append(name, text);
    }
    Ok(values)
}

/// Decodes the body of `request` as one JSON document.
pub fn decode_json<T: DeserializeOwned>(request: &Request) -> DecodeResult<T> {
    let mut documents = serde_json::Deserializer::from_slice(request.body()).into_iter::<T>();
    match documents.next() {
        Some(value) => Ok(value?),
        None => Err(DecodeError::EmptyJson),
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Article {
        category: String,
        id: i64,
    }

    impl FormSchema for Article {}

    #[derive(Debug, Deserialize)]
    struct Rename {
        newname: String,
    }

    impl FormSchema for Rename {
        const REQUIRED: &'static [&'static str] = &["newname"];
    }

    fn request(method: &str, uri: &str, content_type: Option<&str>, body: &str) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder
            .body(Bytes::from(body.to_owned()))
            .map(Request::from)
            .unwrap()
    }

    #[test]
    fn test_get_path_vars_override_query() {
        let req = request("GET", "/articles/x/?category=query&id=3", None, "")
            .with_path_var("category", "path");
        let article: Article = decode_get(&req).unwrap();
        assert_eq!(article.category, "path");
        assert_eq!(article.id, 3);
    }

    #[test]
    fn test_get_reports_query_prefix() {
        let req = request("GET", "/?id=not-a-number", None, "");
        let err = decode_get::<Article>(&req).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse url/query: schema: error converting value for \"id\""
        );
    }

    #[tokio::test]
    async fn test_invalid_escapes_are_rejected() {
        let req = request("GET", "/?category=a&id=%zz", None, "");
        let err = decode_get::<Article>(&req).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse url/query: invalid URL escape \"%zz\""
        );

        let req = request("POST", "/", Some(URLENCODED), "newname=%g1");
        let err = decode_post::<Rename>(&req, 1024).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse form input: invalid URL escape \"%g1\""
        );
    }

    #[tokio::test]
    async fn test_post_urlencoded() {
        let req = request("POST", "/", Some(URLENCODED), "newname=dude");
        let rename: Rename = decode_post(&req, 1024).await.unwrap();
        assert_eq!(rename.newname, "dude");

        let req = request("POST", "/", Some(URLENCODED), "newname=");
        let err = decode_post::<Rename>(&req, 1024).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to parse form input: newname is empty");
    }

    #[tokio::test]
    async fn test_post_multipart_skips_files() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"newname\"\r\n\r\n\
            dude\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file contents\r\n\
            --XyZ--\r\n";
        let req = request("POST", "/", Some("multipart/form-data; boundary=XyZ"), body);
        let values = post_values(&req, 1 << 20).await.unwrap();
        assert_eq!(values.first("newname"), Some("dude"));
        assert!(values.get("upload").is_none());
    }

    #[tokio::test]
    async fn test_post_multipart_respects_limit() {
        let body = format!(
            "--XyZ\r\nContent-Disposition: form-data; name=\"big\"\r\n\r\n{}\r\n--XyZ--\r\n",
            "x".repeat(4096)
        );
        let req = request("POST", "/", Some("multipart/form-data; boundary=XyZ"), &body);
        let err = post_values(&req, 128).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to parse form input: "));
    }

    #[tokio::test]
    async fn test_post_other_content_type_is_empty() {
        let req = request("POST", "/", Some("text/plain"), "newname=dude");
        let values = post_values(&req, 1024).await.unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_json_empty_and_invalid() {
        let req = request("POST", "/", None, "");
        let err = decode_json::<serde_json::Value>(&req).unwrap_err();
        assert_eq!(err.to_string(), "failed to decode json body: EOF");

        let req = request("POST", "/", None, "{nope");
        let err = decode_json::<serde_json::Value>(&req).unwrap_err();
        assert!(err.to_string().starts_with("failed to decode json body: "));

        let req = request("POST", "/", None, "{\"a\":1} trailing");
        let value: serde_json::Value = decode_json(&req).unwrap();
        assert_eq!(value["a"], 1);
    }
}
