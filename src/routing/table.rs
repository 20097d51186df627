//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store endpoints and nested tables in registration order
//! - Resolve (method, path) to an endpoint with typed parameters
//! - Tell "no such path" apart from "path exists, method does not"
//! - Build URLs for named endpoints
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan; first full (path + method) match wins
//! - Mounts reject cheaply on their prefix before recursing
//! - 405 unions the methods of every path-matching route, not just the first

use std::sync::Arc;

use axum::http::Method;
use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;

use crate::endpoint::{Endpoint, Handler};
use crate::error::ConfigError;
use crate::routing::pattern::{MatchMode, Params, Pattern};
use crate::routing::{MethodSet, Miss, Router};

/// A resolved route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub endpoint: Arc<Endpoint>,
    pub params: Params,
}

#[derive(Debug)]
enum Entry {
    Route(Arc<Endpoint>),
    Mount {
        prefix: Arc<Pattern>,
        table: RouteTable,
    },
}

/// Ordered collection of routes and mounted sub-tables.
#[derive(Debug)]
pub struct RouteTable {
    router: Arc<Router>,
    entries: Vec<Entry>,
}

impl RouteTable {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            entries: Vec::new(),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Register `handler` for `method` (case-insensitive) at `path`.
    pub fn add_route<H: Handler>(
        &mut self,
        method: &str,
        path: &str,
        handler: H,
    ) -> Result<Arc<Endpoint>, ConfigError> {
        let methods = MethodSet::parse([method])?;
        let endpoint = Arc::new(Endpoint::new(
            &self.router,
            "",
            path,
            methods,
            Arc::new(handler),
        )?);
        self.add_endpoint(endpoint.clone())?;
        Ok(endpoint)
    }

    /// Register an already bound endpoint. Its suffix path is matched here.
    pub fn add_endpoint(&mut self, endpoint: Arc<Endpoint>) -> Result<(), ConfigError> {
        if let Some(name) = endpoint.name() {
            if self.find_named(name).is_some() {
                return Err(ConfigError::DuplicateRoute(name.to_string()));
            }
        }
        self.entries.push(Entry::Route(endpoint));
        Ok(())
    }

    /// Nest `table` under `prefix`, matched in prefix mode.
    pub fn mount(&mut self, prefix: &str, table: RouteTable) -> Result<(), ConfigError> {
        for endpoint in table.endpoints() {
            if let Some(name) = endpoint.name() {
                if self.find_named(name).is_some() {
                    return Err(ConfigError::DuplicateRoute(name.to_string()));
                }
            }
        }
        let prefix = self.router.pattern(prefix)?;
        tracing::debug!(prefix = %prefix.template(), routes = table.len(), "Mounted route table");
        self.entries.push(Entry::Mount { prefix, table });
        Ok(())
    }

    /// Resolve a request. Never errors past this layer: misses are values.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, Miss> {
        let mut miss = Miss::NotFound;
        for entry in &self.entries {
            match entry {
                Entry::Route(endpoint) => {
                    let Some(params) = endpoint.pattern().match_full(path) else {
                        continue;
                    };
                    if endpoint.methods().accepts(method) {
                        return Ok(RouteMatch {
                            endpoint: endpoint.clone(),
                            params,
                        });
                    }
                    miss = miss.merge(Miss::MethodNotAllowed {
                        method: method.clone(),
                        allowed: endpoint.methods().to_vec(),
                    });
                }
                Entry::Mount { prefix, table } => {
                    let Some(found) = prefix.matches(path, MatchMode::Prefix) else {
                        continue;
                    };
                    match table.resolve(method, &path[found.consumed..]) {
                        Ok(mut route) => {
                            let mut params = found.params;
                            params.extend(route.params);
                            route.params = params;
                            return Ok(route);
                        }
                        Err(nested) => miss = miss.merge(nested),
                    }
                }
            }
        }
        Err(miss)
    }

    /// Build the path of the endpoint named `name`, relative to this table.
    pub fn url(&self, name: &str, params: &Params) -> Result<String, ConfigError> {
        for entry in &self.entries {
            match entry {
                Entry::Route(endpoint) if endpoint.name() == Some(name) => {
                    return endpoint.pattern().build(params);
                }
                Entry::Mount { prefix, table } if table.find_named(name).is_some() => {
                    let mut url = prefix.build(params)?;
                    url.push_str(&table.url(name, params)?);
                    return Ok(url);
                }
                _ => {}
            }
        }
        Err(ConfigError::UnknownRoute(name.to_string()))
    }

    fn find_named(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints().find(|e| e.name() == Some(name))
    }

    /// Every endpoint, depth-first in registration order.
    pub fn endpoints<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Arc<Endpoint>> + 'a> {
        Box::new(self.entries.iter().flat_map(
            |entry| -> Box<dyn Iterator<Item = &'a Arc<Endpoint>> + 'a> {
                match entry {
                    Entry::Route(endpoint) => Box::new(std::iter::once(endpoint)),
                    Entry::Mount { table, .. } => table.endpoints(),
                }
            },
        ))
    }

    /// Number of endpoints, nested ones included.
    pub fn len(&self) -> usize {
        self.endpoints().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Service-wide registry of named endpoints, used for URL building.
#[derive(Debug, Default)]
pub struct RouteNames {
    endpoints: DashMap<String, Arc<Endpoint>>,
}

impl RouteNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` under its name. Re-registering the same endpoint
    /// is a no-op; a different endpoint under a taken name is an error.
    pub fn register(&self, endpoint: &Arc<Endpoint>) -> Result<(), ConfigError> {
        let Some(name) = endpoint.name() else {
            return Ok(());
        };
        match self.endpoints.entry(name.to_string()) {
            Slot::Occupied(existing) => {
                if Arc::ptr_eq(existing.get(), endpoint) {
                    Ok(())
                } else {
                    Err(ConfigError::DuplicateRoute(name.to_string()))
                }
            }
            Slot::Vacant(slot) => {
                slot.insert(endpoint.clone());
                Ok(())
            }
        }
    }

    /// Remove `endpoint`'s name, only if it is still the one registered.
    pub fn unregister(&self, endpoint: &Arc<Endpoint>) -> bool {
        let Some(name) = endpoint.name() else {
            return false;
        };
        self.endpoints
            .remove_if(name, |_, existing| Arc::ptr_eq(existing, endpoint))
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.get(name).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
