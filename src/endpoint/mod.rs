//! Endpoint binding subsystem.
//!
//! # Data Flow
//! ```text
//! Component construction:
//!     Resource::new("comment").get("/<key:int>", read)
//!     → binding.rs (path suffix, methods, requirements, handler)
//!     → resource.rs (owning component, mount path)
//!
//! Scope linking (startup):
//!     Binding + mount path
//!     → Endpoint (suffix pattern + full pattern compiled)
//!     → registered into the scope's RouteTable
//!
//! Dispatch:
//!     RouteTable::resolve → Endpoint::invoke(request, params) → handler
//! ```
//!
//! # Design Decisions
//! - Explicit registration at construction time, no runtime introspection
//! - A handler may be bound several times; each binding registers on its own
//! - Endpoints are immutable once bound and owned by their component

pub mod binding;
pub mod resource;

pub use binding::{Binding, Requirements};
pub use resource::{Binder, Component, Resource};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::error::{ConfigError, Error};
use crate::http::{IntoReply, Reply, Request};
use crate::routing::{MethodSet, Miss, Params, Pattern, Router};

/// A request handler: receives the request context and the typed parameters
/// extracted by the matched pattern.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, params: Params) -> BoxFuture<'static, Result<Reply, Error>>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, request: Request, params: Params) -> BoxFuture<'static, Result<Reply, Error>> {
        let future = self(request, params);
        Box::pin(async move { future.await.map(IntoReply::into_reply) })
    }
}

/// A bound (path, methods, handler) triple.
pub struct Endpoint {
    name: Option<String>,
    mount: String,
    path: String,
    methods: MethodSet,
    pattern: Arc<Pattern>,
    full: Arc<Pattern>,
    requirements: Requirements,
    handler: Arc<dyn Handler>,
}

impl Endpoint {
    /// Bind `handler` at `path`, relative to the owning component's `mount`.
    pub fn new(
        router: &Router,
        mount: &str,
        path: &str,
        methods: MethodSet,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ConfigError> {
        let pattern = router.pattern(path)?;
        let full = router.pattern(&format!("{}{}", mount, path))?;
        Ok(Self {
            name: None,
            mount: mount.to_string(),
            path: path.to_string(),
            methods,
            pattern,
            full,
            requirements: Requirements::default(),
            handler,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Path suffix relative to the mount.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    /// Suffix pattern, matched inside the mount's table.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Mount path + suffix.
    pub fn full_pattern(&self) -> &Pattern {
        &self.full
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Match an absolute path and method against this endpoint alone.
    ///
    /// A path match with the wrong method is `MethodNotAllowed`, never
    /// `NotFound`, so callers can tell "wrong method here" from "try the
    /// next endpoint".
    pub fn match_request(&self, method: &Method, path: &str) -> Result<Params, Miss> {
        let params = self.full.match_full(path).ok_or(Miss::NotFound)?;
        if self.methods.accepts(method) {
            Ok(params)
        } else {
            Err(Miss::MethodNotAllowed {
                method: method.clone(),
                allowed: self.methods.to_vec(),
            })
        }
    }

    /// Check requirements, then run the handler.
    pub async fn invoke(&self, mut request: Request, params: Params) -> Result<Reply, Error> {
        self.requirements.check(&request)?;
        tracing::debug!(
            endpoint = self.name().unwrap_or("-"),
            template = %self.full.template(),
            "Invoking endpoint"
        );
        request.set_params(params.clone());
        self.handler.call(request, params).await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("template", &self.full.template())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}
