//! Middleware chain subsystem.
//!
//! # Data Flow
//! ```text
//! Service::handle(request)
//!     → chain.rs (root snapshot, first node whose guard admits the request)
//!     → Middleware::process(request, next)
//!         → next.run(request) → following node ... → tail
//!     → tail: scope dispatcher (RouteTable::resolve → Endpoint::invoke)
//!             or NotFound when the chain runs off its end
//!     ← Reply / Error flows back up in reverse order
//! ```
//!
//! # Design Decisions
//! - Onion ordering: registration order on the way in, reverse on the way out
//! - A middleware whose path/method guard rejects the request is skipped
//!   without running `process`
//! - Topology is an immutable snapshot swapped atomically on relink;
//!   in-flight requests finish on the snapshot they started with
//! - Scopes (`scope.rs`) nest a sub-chain and a sub-dispatcher under a prefix

pub mod chain;
pub mod request_id;
pub mod scope;

pub use chain::{Chain, LinkContext, LinkInfo, Next};
pub use request_id::RequestId;
pub use scope::Scope;

use std::future::Future;

use async_trait::async_trait;

use crate::error::{ConfigError, Error};
use crate::http::{Reply, Request};
use crate::routing::MethodSet;

/// A request processor in the chain.
///
/// Implementations may mutate the request before forwarding, rewrite the
/// reply or error afterwards, or short-circuit by not calling `next`.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Unique within its chain. Defaults to the lowercase type name.
    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_lowercase()
    }

    /// Path prefix, relative to the owning scope, this middleware applies to.
    fn path(&self) -> &str {
        ""
    }

    fn methods(&self) -> MethodSet {
        MethodSet::any()
    }

    async fn process(&self, request: Request, next: Next) -> Result<Reply, Error> {
        next.run(request).await
    }

    /// Called whenever the owning chain is relinked.
    fn link(&self, _context: &LinkContext) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Called when the middleware leaves a linked chain, or when the relink
    /// that added it failed. Releases whatever `link` registered.
    fn unlink(&self, _context: &LinkContext) {}
}

/// Middleware built from a closure.
pub struct FnMiddleware<F> {
    name: String,
    path: String,
    methods: MethodSet,
    f: F,
}

/// Wrap `f` as a middleware named `name`.
///
/// ```ignore
/// let auth = from_fn("auth", |request: Request, next: Next| async move {
///     if request.header("authorization").is_none() {
///         return Err(HttpError::unauthorized().into());
///     }
///     next.run(request).await
/// });
/// ```
pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
{
    FnMiddleware {
        name: name.into(),
        path: String::new(),
        methods: MethodSet::any(),
        f,
    }
}

impl<F> FnMiddleware<F> {
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, Error>> + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn methods(&self) -> MethodSet {
        self.methods.clone()
    }

    async fn process(&self, request: Request, next: Next) -> Result<Reply, Error> {
        (self.f)(request, next).await
    }
}
