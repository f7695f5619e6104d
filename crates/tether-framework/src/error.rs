//! Error types for the Tether framework.

use std::fmt;

use thiserror::Error;

/// Raised while building a wrapped handler when part of its signature cannot be served.
///
/// These are programming errors: they surface once, at startup, never per request.
#[derive(Debug, Clone, Error)]
pub enum WrapError {
    /// No extractor is registered for a parameter type.
    #[error("tether: {handler}: don't know how to produce parameter {index} ({type_name})")]
    UnknownParameter {
        /// Type name of the handler.
        handler: &'static str,
        /// Zero-based position of the parameter.
        index: usize,
        /// Type name of the parameter.
        type_name: &'static str,
    },

    /// No return handler is registered for the output type.
    #[error("tether: {handler}: don't know how to handle return type {type_name}")]
    UnknownReturn {
        /// Type name of the handler.
        handler: &'static str,
        /// Type name of the output.
        type_name: &'static str,
    },
}

/// An extracted argument did not have the type the handler expects.
///
/// Only reachable when a registry entry lies about the type it produces.
#[derive(Debug, Clone, Error)]
#[error("argument mismatch: expected {expected}")]
pub struct ArgumentMismatch {
    /// Type name the handler expected.
    pub expected: &'static str,
}

/// Errors produced when decoding form or query values into a struct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A value could not be converted to the field's type.
    #[error("schema: error converting value for \"{key}\"")]
    Conversion {
        /// The offending key.
        key: String,
    },

    /// A required field was missing or empty.
    #[error("{key} is empty")]
    EmptyField {
        /// The missing key.
        key: String,
    },

    /// Url-encoded input held a `%` not followed by two hex digits.
    #[error("invalid URL escape \"{0}\"")]
    InvalidEscape(String),

    /// The target type asked for something form data cannot express.
    #[error("schema: {0}")]
    Custom(String),

    /// Several of the above at once.
    #[error("{}", MultiDisplay(.0))]
    Multi(Vec<FormError>),
}

impl FormError {
    /// Creates a conversion error for `key`.
    pub fn conversion(key: impl Into<String>) -> Self {
        Self::Conversion { key: key.into() }
    }

    /// Creates an empty-field error for `key`.
    pub fn empty_field(key: impl Into<String>) -> Self {
        Self::EmptyField { key: key.into() }
    }

    /// Folds collected errors into one, or `None` if there were none.
    pub fn collect(mut errors: Vec<FormError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multi(errors)),
        }
    }
}

impl serde::de::Error for FormError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

struct MultiDisplay<'a>(&'a [FormError]);

impl fmt::Display for MultiDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => f.write_str("(0 errors)"),
            [only] => write!(f, "{only}"),
            [first, _] => write!(f, "{first} (and 1 other error)"),
            [first, rest @ ..] => write!(f, "{first} (and {} other errors)", rest.len()),
        }
    }
}

/// Errors produced by the request decoders.
///
/// The display text is what the client sees in a 400 response.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Query string or path variables did not fit the target.
    #[error("failed to parse url/query: {0}")]
    Query(#[source] FormError),

    /// The POST form did not fit the target.
    #[error("failed to parse form input: {0}")]
    Form(#[source] FormError),

    /// The multipart body could not be read.
    #[error("failed to parse form input: {0}")]
    Multipart(#[from] multer::Error),

    /// The body was empty where a JSON document was expected.
    #[error("failed to decode json body: EOF")]
    EmptyJson,

    /// The body was not valid JSON for the target.
    #[error("failed to decode json body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_display() {
        let one = FormError::empty_field("newname");
        assert_eq!(one.to_string(), "newname is empty");

        let two = FormError::collect(vec![
            FormError::conversion("id"),
            FormError::empty_field("name"),
        ])
        .unwrap();
        assert_eq!(
            two.to_string(),
            "schema: error converting value for \"id\" (and 1 other error)"
        );

        let three = FormError::Multi(vec![
            FormError::conversion("a"),
            FormError::conversion("b"),
            FormError::conversion("c"),
        ]);
        assert_eq!(
            three.to_string(),
            "schema: error converting value for \"a\" (and 2 other errors)"
        );
    }

    #[test]
    fn test_decode_error_prefixes() {
        let err = DecodeError::Query(FormError::conversion("id"));
        assert_eq!(
            err.to_string(),
            "failed to parse url/query: schema: error converting value for \"id\""
        );
        assert_eq!(
            DecodeError::EmptyJson.to_string(),
            "failed to decode json body: EOF"
        );
    }
}
