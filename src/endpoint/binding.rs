//! Handler bindings declared by a component.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderName;

use crate::endpoint::{Endpoint, Handler};
use crate::error::{ConfigError, HttpError};
use crate::http::Request;
use crate::routing::{MethodSet, Router};

/// Extra per-binding conditions checked after the route matched.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    headers: Vec<HeaderName>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName) -> Self {
        if !self.headers.contains(&name) {
            self.headers.push(name);
        }
        self
    }

    pub fn headers(&self) -> &[HeaderName] {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// A matched request missing a required header is a client error.
    pub fn check(&self, request: &Request) -> Result<(), HttpError> {
        match self
            .headers
            .iter()
            .find(|name| !request.headers().contains_key(*name))
        {
            Some(missing) => Err(HttpError::bad_request(format!(
                "Missing required header `{}`",
                missing
            ))),
            None => Ok(()),
        }
    }
}

/// One (path suffix, methods, handler) declaration.
#[derive(Clone)]
pub struct Binding {
    pub(crate) name: Option<String>,
    pub(crate) path: String,
    pub(crate) methods: MethodSet,
    pub(crate) requirements: Requirements,
    pub(crate) handler: Arc<dyn Handler>,
}

impl Binding {
    pub fn new(path: impl Into<String>, methods: MethodSet, handler: impl Handler) -> Self {
        Self {
            name: None,
            path: path.into(),
            methods,
            requirements: Requirements::default(),
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Compile into an endpoint under `mount`. Named bindings are qualified
    /// with the owner's name: `comment` + `read` → `comment.read`.
    pub fn bind(&self, router: &Router, owner: &str, mount: &str) -> Result<Endpoint, ConfigError> {
        let endpoint = Endpoint::new(
            router,
            mount,
            &self.path,
            self.methods.clone(),
            self.handler.clone(),
        )?
        .with_requirements(self.requirements.clone());
        Ok(match &self.name {
            Some(name) => endpoint.with_name(format!("{}.{}", owner, name)),
            None => endpoint,
        })
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("requirements", &self.requirements)
            .finish_non_exhaustive()
    }
}
