//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::http::{Method, Uri};
use axum::response::Response;
use switchyard::Request;

/// Bare request with no headers or body.
pub fn request(method: Method, uri: &str) -> Request {
    let uri: Uri = uri.parse().unwrap();
    Request::new(method, uri)
}

pub fn get(uri: &str) -> Request {
    request(Method::GET, uri)
}

pub fn with_header(mut request: Request, name: &'static str, value: &str) -> Request {
    request
        .headers_mut()
        .insert(name, value.parse().unwrap());
    request
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
