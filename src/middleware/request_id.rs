//! Request id propagation.
//!
//! Reuses a well-formed incoming `x-request-id`, otherwise assigns a UUID v4.
//! The id is stored in the request extensions, attached to the reply (or to
//! the error on its way out) and recorded on a tracing span around the rest
//! of the chain.

use async_trait::async_trait;
use axum::http::HeaderValue;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::Error;
use crate::http::{Reply, Request, RequestIdValue, X_REQUEST_ID};
use crate::middleware::{Middleware, Next};

const MAX_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl RequestId {
    fn incoming(request: &Request) -> Option<String> {
        request
            .header(X_REQUEST_ID.as_str())
            .filter(|id| !id.is_empty() && id.len() <= MAX_ID_LEN)
            .filter(|id| id.bytes().all(|b| b.is_ascii_graphic()))
            .map(str::to_string)
    }
}

#[async_trait]
impl Middleware for RequestId {
    fn name(&self) -> String {
        "request_id".into()
    }

    async fn process(&self, mut request: Request, next: Next) -> Result<Reply, Error> {
        let id = Self::incoming(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
        request
            .extensions_mut()
            .insert(RequestIdValue(id.clone()));

        let span = tracing::info_span!("request", request_id = %id);
        match next.run(request).instrument(span).await {
            Ok(mut reply) => {
                if let Ok(value) = HeaderValue::from_str(&id) {
                    reply.headers_mut().insert(X_REQUEST_ID, value);
                }
                Ok(reply)
            }
            Err(Error::Http(error)) => Err(error.with_header(X_REQUEST_ID, &id).into()),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{from_fn, Chain};
    use axum::http::{Method, Uri};

    fn chain() -> Chain {
        let chain = Chain::new();
        chain.push(RequestId).unwrap();
        chain
            .push(from_fn("echo", |request: Request, _next| async move {
                Ok::<_, Error>(Reply::text(request.request_id().unwrap_or("-").to_string()))
            }))
            .unwrap();
        chain.rebuild().unwrap();
        chain
    }

    #[tokio::test]
    async fn test_assigns_id() {
        let reply = chain()
            .process(Request::new(Method::GET, Uri::from_static("/")))
            .await
            .unwrap();
        let header = reply.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(header).is_ok());
    }

    #[tokio::test]
    async fn test_reuses_incoming_id() {
        let mut request = Request::new(Method::GET, Uri::from_static("/"));
        request
            .headers_mut()
            .insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        let reply = chain().process(request).await.unwrap();
        assert_eq!(reply.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
        assert!(matches!(reply.payload(), crate::http::Payload::Text(t) if t == "abc-123"));
    }

    #[tokio::test]
    async fn test_tags_errors() {
        let chain = Chain::new();
        chain.push(RequestId).unwrap();
        chain.rebuild().unwrap();
        let error = chain
            .process(Request::new(Method::GET, Uri::from_static("/")))
            .await
            .unwrap_err();
        assert!(error.as_http().unwrap().headers().contains_key(X_REQUEST_ID));
    }
}
