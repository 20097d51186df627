//! Error taxonomy.
//!
//! # Layers
//! - `HttpError`: a structured HTTP outcome (status + message + headers).
//!   Handlers return it to short-circuit; middlewares may catch and rewrite it.
//! - `Error`: what request-time code returns. Either an `HttpError` or an
//!   unexpected internal failure that the service boundary turns into a 500.
//! - `ConfigError`: construction-time failures. Fatal to startup, never
//!   deferred to request time.
//!
//! Routing misses and converter rejections never show up here; they are
//! resolved inside the matcher and dispatcher (see `routing::Miss`).

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::config::validation::ValidationError;

/// A structured HTTP outcome raised as an error.
///
/// Not every `HttpError` is a failure: `HttpError::created()` is the
/// success-as-error pattern for a 201 with headers but no body.
#[derive(Debug, Clone, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Uses the canonical reason phrase as message.
    pub fn from_status(status: StatusCode) -> Self {
        let message = status.canonical_reason().unwrap_or("Unknown Status");
        Self::new(status, message)
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    /// 405 with an `Allow` header listing `allowed`.
    pub fn method_not_allowed(method: &Method, allowed: &[Method]) -> Self {
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut error = Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} is not allowed for this resource", method),
        );
        if let Ok(value) = HeaderValue::from_str(&allow) {
            error.headers.insert(header::ALLOW, value);
        }
        error
    }

    pub fn unauthorized() -> Self {
        Self::from_status(StatusCode::UNAUTHORIZED)
    }

    pub fn created() -> Self {
        Self::from_status(StatusCode::CREATED)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Generic 500. The message never carries internal detail.
    pub fn server_error() -> Self {
        Self::from_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Attach a header. Invalid header values are dropped with a warning.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// True for statuses whose response carries no error envelope.
    pub fn is_bodiless(&self) -> bool {
        !(self.status.is_client_error() || self.status.is_server_error())
    }
}

/// Error type returned by handlers and middlewares.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap any error as an unexpected internal failure.
    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Internal(error.into())
    }

    /// The structured HTTP error, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Http(e) => Some(e),
            Error::Internal(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Http(e) => e.status(),
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::internal(e)
    }
}

/// Construction-time configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unsupported converter `{0}`")]
    UnknownConverter(String),

    #[error("Invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid pattern for \"{path}\": {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("Duplicate route name `{0}`")]
    DuplicateRoute(String),

    #[error("Duplicate middleware name `{0}`")]
    DuplicateMiddleware(String),

    #[error("Cannot build \"{path}\": missing parameter `{name}`")]
    MissingParameter { path: String, name: String },

    #[error("Unknown route name `{0}`")]
    UnknownRoute(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
