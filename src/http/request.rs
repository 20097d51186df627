//! Request context threaded through the middleware chain.
//!
//! # Responsibilities
//! - Carry the parsed request (method, URI, headers, buffered body)
//! - Carry request-scoped data attached by middlewares (extensions)
//! - Carry the parameters extracted by the dispatcher
//! - Percent-decode the path once; routing matches the decoded form
//!
//! # Design Decisions
//! - Owned and moved down the chain; a middleware mutates it before
//!   forwarding and gets a `Reply` back
//! - Created when the request arrives, dropped once the reply is produced

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{request::Parts, Extensions, HeaderMap, HeaderName, Method, Uri, Version};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;

use crate::error::{Error, HttpError};
use crate::routing::Params;
use crate::service::ServiceData;

/// Header used to correlate a request across logs and services.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id assigned by the `RequestId` middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdValue(pub String);

#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    path: String,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
    peer: Option<SocketAddr>,
    params: Params,
}

impl Request {
    /// Bare request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            path: decode_path(&uri),
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
            peer: None,
            params: Params::new(),
        }
    }

    /// Build from the parts handed over by the HTTP engine.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            path: decode_path(&parts.uri),
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            extensions: parts.extensions,
            peer: None,
            params: Params::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Percent-decoded path, as seen by routing.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path exactly as received.
    pub fn raw_path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Decode the body as JSON. Malformed input is the client's fault (400).
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::bad_request(format!("Invalid JSON body: {}", e)).into())
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Parameters extracted by the dispatcher; empty before dispatch.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Request id, if the `RequestId` middleware ran.
    pub fn request_id(&self) -> Option<&str> {
        self.extensions
            .get::<RequestIdValue>()
            .map(|id| id.0.as_str())
    }

    /// Service-scoped data of the service handling this request.
    pub fn service_data(&self) -> Option<&Arc<ServiceData>> {
        self.extensions.get::<Arc<ServiceData>>()
    }
}

/// Invalid UTF-8 sequences decode to U+FFFD.
fn decode_path(uri: &Uri) -> String {
    percent_decode_str(uri.path()).decode_utf8_lossy().into_owned()
}

impl From<axum::http::Request<Bytes>> for Request {
    fn from(request: axum::http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body)
    }
}
