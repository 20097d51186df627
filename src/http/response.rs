//! Handler replies and their conversion to wire responses.
//!
//! # Responsibilities
//! - `Reply`: what handlers and middlewares pass back up the chain
//! - Encode data payloads through the service's `Formatter`
//! - Render `HttpError`s as responses (`{"error": ...}` envelope)
//!
//! # Design Decisions
//! - Data stays un-encoded until the boundary so middlewares can inspect it
//! - Informational/success/redirect errors (e.g. 201) carry no body

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;

use crate::error::{Error, HttpError};
use crate::http::formatter::Formatter;

/// Body of a reply.
pub enum Payload {
    Empty,
    /// Structured data, encoded by the formatter at the boundary.
    Data(serde_json::Value),
    /// Plain text.
    Text(String),
    /// Pre-built body, passed through untouched.
    Raw(Body),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Data(data) => f.debug_tuple("Data").field(data).finish(),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// A handler's result on its way back up the chain.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    payload: Payload,
}

impl Reply {
    pub fn new(status: StatusCode, payload: Payload) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload,
        }
    }

    pub fn empty() -> Self {
        Self::new(StatusCode::OK, Payload::Empty)
    }

    pub fn data(data: serde_json::Value) -> Self {
        Self::new(StatusCode::OK, Payload::Data(data))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, Payload::Text(text.into()))
    }

    /// Serialize any value into a data reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Self::data(serde_json::to_value(value)?))
    }

    /// Render a structured error as a reply, so middlewares can rescue it.
    pub fn from_error(error: &HttpError) -> Self {
        let payload = if error.is_bodiless() {
            Payload::Empty
        } else {
            Payload::Data(serde_json::json!({ "error": error.message() }))
        };
        let mut reply = Self::new(error.status(), payload);
        reply.headers = error.headers().clone();
        reply
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// The data payload, if this reply carries one.
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Encode into a wire response.
    pub fn into_response(self, formatter: &dyn Formatter) -> Response {
        let Reply {
            status,
            headers,
            payload,
        } = self;

        let (content_type, body) = match payload {
            Payload::Empty => (None, Body::empty()),
            Payload::Text(text) => (Some("text/plain; charset=utf-8"), Body::from(text)),
            Payload::Raw(body) => (None, body),
            Payload::Data(data) => match formatter.encode(&data) {
                Ok(bytes) => (Some(formatter.content_type()), Body::from(bytes)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode reply data");
                    return Reply::from_error(&HttpError::server_error())
                        .into_plain_response();
                }
            },
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        if let Some(content_type) = content_type {
            if !response.headers().contains_key(header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(content_type) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
            }
        }
        response
    }

    /// Last-resort rendering that needs no formatter.
    fn into_plain_response(self) -> Response {
        let mut response = Response::new(Body::from(
            self.status.canonical_reason().unwrap_or("Error").to_string(),
        ));
        *response.status_mut() = self.status;
        response
    }
}

/// Conversion of handler return values into a `Reply`.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Reply {
        Reply::data(self)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::text(self)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply {
        Reply::text(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::empty()
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply {
        let (parts, body) = self.into_parts();
        let mut reply = Reply::new(parts.status, Payload::Raw(body));
        reply.headers = parts.headers;
        reply
    }
}

impl<T: IntoReply> IntoReply for (StatusCode, T) {
    fn into_reply(self) -> Reply {
        self.1.into_reply().with_status(self.0)
    }
}
