//! Routable components.
//!
//! A `Resource` is a named group of bindings mounted under a path. Bindings
//! are declared with ordinary builder calls:
//!
//! ```ignore
//! let comment = Resource::new("comment")
//!     .get("/<key:int>", read)
//!     .named("read")
//!     .put("/<key:int>", upsert)
//!     .post("/<key:int>", upsert);
//! ```
//!
//! Components with state implement `Component` and declare their bindings
//! through a `Binder`, which hands each handler an `Arc` of the component.

use std::future::Future;
use std::sync::Arc;

use axum::http::{HeaderName, Method};

use crate::endpoint::binding::Binding;
use crate::endpoint::{Endpoint, Handler};
use crate::error::{ConfigError, Error};
use crate::http::{IntoReply, Request};
use crate::routing::{MethodSet, Params, Router};

/// A named, mountable group of endpoint bindings.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    path: String,
    bindings: Vec<Binding>,
}

impl Resource {
    /// Mounted at `/<lowercase name>` unless moved with `at`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("/{}", name.to_lowercase());
        Self {
            name,
            path,
            bindings: Vec::new(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn bind(mut self, methods: MethodSet, path: impl Into<String>, handler: impl Handler) -> Self {
        self.push_binding(Binding::new(path, methods, handler));
        self
    }

    pub(crate) fn push_binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub(crate) fn name_last(&mut self, name: impl Into<String>) {
        if let Some(binding) = self.bindings.last_mut() {
            binding.name = Some(name.into());
        }
    }

    pub(crate) fn require_last(&mut self, header: HeaderName) {
        if let Some(binding) = self.bindings.last_mut() {
            binding.requirements = binding.requirements.clone().header(header);
        }
    }

    pub fn get(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::GET), path, handler)
    }

    pub fn post(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::POST), path, handler)
    }

    pub fn put(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::PUT), path, handler)
    }

    pub fn delete(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::DELETE), path, handler)
    }

    pub fn patch(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::PATCH), path, handler)
    }

    pub fn head(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::HEAD), path, handler)
    }

    pub fn options(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::only(Method::OPTIONS), path, handler)
    }

    /// Any method.
    pub fn any(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.bind(MethodSet::any(), path, handler)
    }

    /// Name the most recent binding.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name_last(name);
        self
    }

    /// Require `header` on the most recent binding.
    pub fn require_header(mut self, header: HeaderName) -> Self {
        self.require_last(header);
        self
    }

    /// Bind every declaration under `mount`, in declaration order.
    pub fn endpoints(&self, router: &Router, mount: &str) -> Result<Vec<Arc<Endpoint>>, ConfigError> {
        let owner = self.name.to_lowercase();
        self.bindings
            .iter()
            .map(|binding| binding.bind(router, &owner, mount).map(Arc::new))
            .collect()
    }

    /// Build a resource from a stateful component.
    pub fn from_component<C: Component>(component: C) -> Self {
        let resource = Resource::new(component.name()).at(component.path());
        let mut binder = Binder {
            component: Arc::new(component),
            resource,
        };
        C::bind(&mut binder);
        binder.resource
    }
}

/// A stateful routable component.
pub trait Component: Send + Sync + Sized + 'static {
    fn name(&self) -> String;

    fn path(&self) -> String {
        format!("/{}", self.name().to_lowercase())
    }

    /// Declare the component's bindings.
    fn bind(binder: &mut Binder<Self>);
}

/// Collects the bindings of a `Component`.
pub struct Binder<C> {
    component: Arc<C>,
    resource: Resource,
}

impl<C: Component> Binder<C> {
    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    pub fn bind<F, Fut, R>(&mut self, methods: MethodSet, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        let component = self.component.clone();
        let handler = move |request: Request, params: Params| {
            handler(component.clone(), request, params)
        };
        self.resource
            .push_binding(Binding::new(path, methods, handler));
        self
    }

    pub fn get<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::GET), path, handler)
    }

    pub fn post<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::POST), path, handler)
    }

    pub fn put<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::PUT), path, handler)
    }

    pub fn delete<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::DELETE), path, handler)
    }

    pub fn patch<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::PATCH), path, handler)
    }

    pub fn head<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::HEAD), path, handler)
    }

    pub fn options<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::only(Method::OPTIONS), path, handler)
    }

    /// Any method.
    pub fn any<F, Fut, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<C>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: IntoReply,
    {
        self.bind(MethodSet::any(), path, handler)
    }

    /// Name the most recent binding.
    pub fn named(&mut self, name: &str) -> &mut Self {
        self.resource.name_last(name);
        self
    }

    /// Require `header` on the most recent binding.
    pub fn require_header(&mut self, header: HeaderName) -> &mut Self {
        self.resource.require_last(header);
        self
    }
}
