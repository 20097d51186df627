//! Tree-shaped composition: a sub-chain and a sub-dispatcher under a prefix.
//!
//! A `Scope` is itself a middleware. When its guard admits a request it runs
//! its own chain; the end of that chain dispatches to the scope's resources.
//! A request no resource matches continues with the middleware after the
//! scope in the enclosing chain, so sibling scopes can share a prefix.
//! A method mismatch also consults the rest of the chain: a later match
//! answers, otherwise the 405 stands with the `Allow` sets of both.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::endpoint::{Endpoint, Resource};
use crate::error::{ConfigError, Error};
use crate::http::{Reply, Request};
use crate::middleware::chain::{Chain, LinkContext, Next, Tail};
use crate::middleware::Middleware;
use crate::routing::{MethodSet, RouteTable, Router};

pub struct Scope {
    name: String,
    path: String,
    methods: MethodSet,
    chain: Chain,
    resources: Vec<Resource>,
    table: ArcSwap<RouteTable>,
    linked_base: Mutex<Option<String>>,
}

impl Scope {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            methods: MethodSet::any(),
            chain: Chain::new(),
            resources: Vec::new(),
            table: ArcSwap::from_pointee(RouteTable::new(Arc::new(Router::new()))),
            linked_base: Mutex::new(None),
        }
    }

    pub fn with_methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }

    /// Stage a middleware. Errors surface on duplicate names.
    pub fn middleware(self, middleware: impl Middleware) -> Result<Self, ConfigError> {
        self.chain.push(middleware)?;
        Ok(self)
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Nest `scope` at the end of this scope's chain.
    pub fn scope(self, scope: Scope) -> Result<Self, ConfigError> {
        self.middleware(scope)
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Run as the outermost scope: a miss is a 404.
    pub async fn serve(&self, request: Request) -> Result<Reply, Error> {
        let tail = Tail::Dispatch {
            table: self.table.load_full(),
            fallthrough: None,
        };
        self.chain.entry(tail).run(request).await
    }

    /// Bind every resource under `base`. On error no name stays registered.
    fn build_table(&self, context: &LinkContext, base: &str) -> Result<RouteTable, ConfigError> {
        let mut registered = Vec::new();
        let result = self.bind_resources(context, base, &mut registered);
        if result.is_err() {
            for endpoint in &registered {
                context.names.unregister(endpoint);
            }
        }
        result
    }

    fn bind_resources(
        &self,
        context: &LinkContext,
        base: &str,
        registered: &mut Vec<Arc<Endpoint>>,
    ) -> Result<RouteTable, ConfigError> {
        let router = &context.router;
        let mut table = RouteTable::new(router.clone());
        for resource in &self.resources {
            let mount = format!("{}{}", base, resource.path());
            let mut nested = RouteTable::new(router.clone());
            for endpoint in resource.endpoints(router, &mount)? {
                context.names.register(&endpoint)?;
                registered.push(endpoint.clone());
                nested.add_endpoint(endpoint)?;
            }
            tracing::info!(
                scope = %self.name,
                resource = %resource.name(),
                mount = %mount,
                endpoints = nested.len(),
                "Bound resource"
            );
            table.mount(&mount, nested)?;
        }
        Ok(table)
    }

    /// Drop this scope's names and detach its sub-chain.
    fn release(&self, context: &LinkContext) {
        let table = self.table.load_full();
        for endpoint in table.endpoints() {
            context.names.unregister(endpoint);
        }
        self.chain.unlink();
        tracing::info!(scope = %self.name, endpoints = table.len(), "Released scope");
    }
}

#[async_trait]
impl Middleware for Scope {
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
        let tail = Tail::Dispatch {
            table: self.table.load_full(),
            fallthrough: Some(Box::new(next)),
        };
        self.chain.entry(tail).run(request).await
    }

    /// Bind resources under the absolute prefix and link the sub-chain.
    /// Relinking at an unchanged prefix keeps the existing table.
    fn link(&self, context: &LinkContext) -> Result<(), ConfigError> {
        let base = format!("{}{}", context.base, self.path);
        let mut linked = self
            .linked_base
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if linked.as_deref() == Some(base.as_str()) {
            return Ok(());
        }
        if linked.take().is_some() {
            self.release(context);
        }

        let table = self.build_table(context, &base)?;
        if let Err(e) = self.chain.link(context.child(base.clone(), &self.name)) {
            self.chain.unlink();
            for endpoint in table.endpoints() {
                context.names.unregister(endpoint);
            }
            return Err(e);
        }
        self.table.store(Arc::new(table));
        *linked = Some(base);
        Ok(())
    }

    fn unlink(&self, context: &LinkContext) {
        let mut linked = self
            .linked_base
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if linked.take().is_some() {
            self.release(context);
        }
    }
}
