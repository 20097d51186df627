//! switchyard demo server.
//!
//! Serves a small comment API:
//!
//! ```text
//! GET  {prefix}/comment/key=<key:myint>   → {"key": key}
//! PUT  {prefix}/comment                   → 201 (requires a session)
//! POST {prefix}/comment                   → 201 (requires a session)
//! ```
//!
//! A request carrying an `authorization` header has a session; `POST`s
//! without one are rejected with 401 before reaching the endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::net::TcpListener;

use switchyard::config::{load_config, ServiceConfig};
use switchyard::observability::logging;
use switchyard::routing::{Converter, MethodSet, Params};
use switchyard::{
    Binder, Component, Error, HttpError, HttpServer, Middleware, Next, Reply, Request, RequestId,
    Resource, Scope, ServiceBuilder,
};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Routing and middleware demo service", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Whether the request carries a session.
#[derive(Debug, Clone, Copy)]
struct User {
    authenticated: bool,
}

struct Session;

#[async_trait]
impl Middleware for Session {
    async fn process(&self, mut request: Request, next: Next) -> Result<Reply, Error> {
        let authenticated = request.header("authorization").is_some();
        request.extensions_mut().insert(User { authenticated });
        next.run(request).await
    }
}

struct Auth;

#[async_trait]
impl Middleware for Auth {
    fn methods(&self) -> MethodSet {
        MethodSet::only(axum::http::Method::POST)
    }

    async fn process(&self, request: Request, next: Next) -> Result<Reply, Error> {
        let authenticated = request
            .extensions()
            .get::<User>()
            .is_some_and(|user| user.authenticated);
        if !authenticated {
            return Err(HttpError::unauthorized().into());
        }
        next.run(request).await
    }
}

struct Comment;

impl Comment {
    async fn read(self: Arc<Self>, _request: Request, params: Params) -> Result<Reply, Error> {
        Ok(Reply::data(params.to_json()))
    }

    async fn upsert(self: Arc<Self>, request: Request, _params: Params) -> Result<Reply, Error> {
        tracing::info!(request_id = request.request_id().unwrap_or("-"), "Adding custom header");
        Err(HttpError::created()
            .with_header(axum::http::HeaderName::from_static("endpoint"), "upsert")
            .into())
    }
}

impl Component for Comment {
    fn name(&self) -> String {
        "comment".into()
    }

    fn path(&self) -> String {
        String::new()
    }

    fn bind(binder: &mut Binder<Self>) {
        binder.get("/key=<key:myint>", Self::read).named("read");
        binder.put("", Self::upsert).named("upsert");
        binder.post("", Self::upsert);
    }
}

fn build_service(config: &ServiceConfig) -> Result<switchyard::Service, switchyard::ConfigError> {
    let comment = Scope::new("comment", "/comment")
        .middleware(Auth)?
        .resource(Resource::from_component(Comment));

    ServiceBuilder::from_config(config)
        .converter("myint", Converter::integer("[1-9][0-9]*"))
        .middleware(RequestId)
        .middleware(Session)
        .scope(comment)
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.logging);
    tracing::info!("switchyard v{} starting", env!("CARGO_PKG_VERSION"));

    let service = Arc::new(build_service(&config)?);
    for node in service.topology() {
        tracing::debug!(
            name = %node.name,
            prev = node.prev.as_deref().unwrap_or("-"),
            next = node.next.as_deref().unwrap_or("-"),
            "Chain node"
        );
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(service, &config.listener).run(listener).await?;
    Ok(())
}
