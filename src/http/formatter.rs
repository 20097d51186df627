//! Body formatters.
//!
//! The service calls a formatter only at the boundary, where a handler's data
//! becomes a wire body. The core never knows the encoding.

use axum::body::Bytes;

use crate::error::{Error, HttpError};

pub trait Formatter: Send + Sync + 'static {
    /// Content type of encoded bodies.
    fn content_type(&self) -> &str;

    fn encode(&self, data: &serde_json::Value) -> Result<Bytes, Error>;

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, Error>;
}

/// JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, data: &serde_json::Value) -> Result<Bytes, Error> {
        Ok(Bytes::from(serde_json::to_vec(data)?))
    }

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, Error> {
        serde_json::from_slice(body)
            .map_err(|e| HttpError::bad_request(format!("Invalid JSON body: {}", e)).into())
    }
}
