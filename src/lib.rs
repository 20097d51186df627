//! Request routing and middleware composition.
//!
//! ```text
//! HTTP engine ─▶ Service::handle ─▶ middleware chain ─▶ dispatcher ─▶ endpoint ─▶ handler
//!                      ▲                  (scopes nest                │
//!                      │                   sub-chains)                │
//!                      └──────────── Reply / Error ◀──────────────────┘
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod middleware;
pub mod observability;
pub mod routing;
pub mod service;

pub use config::ServiceConfig;
pub use endpoint::{Binder, Component, Endpoint, Handler, Resource};
pub use error::{ConfigError, Error, HttpError};
pub use http::{HttpServer, IntoReply, Reply, Request};
pub use middleware::{from_fn, Chain, Middleware, Next, RequestId, Scope};
pub use routing::{Converter, MethodSet, Params, Pattern, Router, Value};
pub use service::{Provider, Service, ServiceBuilder, ServiceData};
