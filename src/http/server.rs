//! HTTP engine adapter.
//!
//! # Responsibilities
//! - Run an axum server with every request routed to one fallback handler
//! - Buffer the body (bounded), capture the peer address
//! - Hand the request to `Service::handle` and return its response
//! - Transport concerns: request timeout, HTTP tracing, graceful shutdown
//!
//! Routing itself never happens here; axum only accepts connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ListenerConfig;
use crate::http::Request;
use crate::service::Service;

#[derive(Clone)]
struct EngineState {
    service: Arc<Service>,
    body_limit: usize,
}

/// Serves a `Service` over HTTP.
pub struct HttpServer {
    router: Router,
    service: Arc<Service>,
}

impl HttpServer {
    pub fn new(service: Arc<Service>, config: &ListenerConfig) -> Self {
        let state = EngineState {
            service: service.clone(),
            body_limit: config.body_limit_bytes,
        };
        let router = Self::build_router(config, state);
        Self { router, service }
    }

    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: EngineState) -> Router {
        Router::new()
            .fallback(engine_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Serve until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn engine_handler(State(state): State<EngineState>, request: axum::extract::Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.body_limit, "Rejected request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut request = Request::from_parts(parts, body);
    if let Some(peer) = peer {
        request.set_peer(peer);
    }
    state.service.handle(request).await
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
