//! Service boundary.
//!
//! # Responsibilities
//! - Own the root scope: converters, middleware chain, resources
//! - Turn every outcome into a wire response: replies are encoded by the
//!   formatter, `HttpError`s become error responses, anything else
//!   (internal errors, panics) becomes a generic 500
//! - Emit one access record per request
//! - Service-scoped data side-table and providers
//! - Reverse URL building for named endpoints
//!
//! # Data Flow
//! ```text
//! HttpServer → Service::handle(request)
//!     → root Scope (middleware chain → dispatcher → endpoint)
//!     → Reply | HttpError | Internal | panic
//!     → Response (formatter) + access record
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::http::Method;
use axum::response::Response;
use dashmap::DashMap;
use futures_util::FutureExt;

use crate::config::ServiceConfig;
use crate::endpoint::Resource;
use crate::error::{ConfigError, Error, HttpError};
use crate::http::{Formatter, JsonFormatter, Reply, Request};
use crate::middleware::{Chain, LinkContext, LinkInfo, Middleware, Scope};
use crate::observability::{AccessRecord, AccessTemplate};
use crate::routing::{Converter, Params, RouteNames, Router};

/// Concurrent typed key-value store attached to a service.
#[derive(Default)]
pub struct ServiceData {
    entries: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.insert(key.into(), value.clone());
        value
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.entries.get(key)?.value().clone();
        entry.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ServiceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ServiceData").field("keys", &keys).finish()
    }
}

/// Asynchronously produces a value for the service data side-table.
#[async_trait]
pub trait Provider: Send + Sync {
    type Output: Any + Send + Sync;

    async fn provide(&self) -> Result<Self::Output, Error>;
}

/// Configures and builds a `Service`.
pub struct ServiceBuilder {
    prefix: String,
    converters: Vec<(String, Converter)>,
    middlewares: Vec<Arc<dyn Middleware>>,
    resources: Vec<Resource>,
    formatter: Arc<dyn Formatter>,
    access: Option<AccessTemplate>,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            converters: Vec::new(),
            middlewares: Vec::new(),
            resources: Vec::new(),
            formatter: Arc::new(JsonFormatter),
            access: Some(AccessTemplate::default()),
        }
    }

    /// Prefix, converters and access logging from configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut builder = Self::new().prefix(config.service.prefix.clone());
        for converter in &config.converters {
            builder = builder.converter(converter.name.clone(), converter.to_converter());
        }
        builder.access = config.logging.access_log.then(|| {
            config
                .logging
                .access_template
                .as_deref()
                .map(AccessTemplate::parse)
                .unwrap_or_default()
        });
        builder
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Register a converter, overriding a built-in of the same name.
    pub fn converter(mut self, name: impl Into<String>, converter: Converter) -> Self {
        self.converters.push((name.into(), converter));
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn scope(self, scope: Scope) -> Self {
        self.middleware(scope)
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn formatter(mut self, formatter: impl Formatter) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn access_template(mut self, template: AccessTemplate) -> Self {
        self.access = Some(template);
        self
    }

    pub fn without_access_log(mut self) -> Self {
        self.access = None;
        self
    }

    /// Compile every pattern, bind every resource and link the chain.
    /// Any configuration error is fatal here, never deferred to a request.
    pub fn build(self) -> Result<Service, ConfigError> {
        let router = Arc::new(Router::with_converters(self.converters));
        let names = Arc::new(RouteNames::new());

        let mut root = Scope::new("service", self.prefix);
        for middleware in self.middlewares {
            root.chain().push_shared(middleware)?;
        }
        for resource in self.resources {
            root = root.resource(resource);
        }
        root.link(&LinkContext::root(router.clone(), names.clone()))?;

        tracing::info!(
            prefix = %root.path(),
            middlewares = root.chain().len(),
            endpoints = names.len(),
            patterns = router.cached(),
            "Service built"
        );

        Ok(Service {
            root,
            router,
            names,
            data: Arc::new(ServiceData::new()),
            formatter: self.formatter,
            access: self.access,
        })
    }
}

/// The outermost request boundary.
pub struct Service {
    root: Scope,
    router: Arc<Router>,
    names: Arc<RouteNames>,
    data: Arc<ServiceData>,
    formatter: Arc<dyn Formatter>,
    access: Option<AccessTemplate>,
}

impl Service {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub async fn handle(&self, mut request: Request) -> Response {
        let started = Instant::now();
        request.extensions_mut().insert(self.data.clone());

        let method = request.method().clone();
        let path = request.raw_path().to_string();
        let access = self.access.as_ref().map(|template| {
            (
                template,
                request.query().map(str::to_string),
                request.version(),
                request.peer(),
                request.headers().clone(),
            )
        });

        let outcome = AssertUnwindSafe(self.root.serve(request))
            .catch_unwind()
            .await;
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(Error::Http(error))) => Reply::from_error(&error),
            Ok(Err(Error::Internal(error))) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    error = %error,
                    detail = ?error,
                    "Unhandled error"
                );
                Reply::from_error(&HttpError::server_error())
            }
            Err(panic) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    panic = panic_message(panic.as_ref()),
                    "Handler panicked"
                );
                Reply::from_error(&HttpError::server_error())
            }
        };

        let mut response = reply.into_response(self.formatter.as_ref());
        if method == Method::HEAD {
            *response.body_mut() = Body::empty();
        }

        if let Some((template, query, version, peer, request_headers)) = access {
            let record = AccessRecord {
                method,
                path,
                query,
                version,
                status: response.status(),
                duration: started.elapsed(),
                peer,
                length: response.body().size_hint().exact(),
                request_headers,
                response_headers: response.headers().clone(),
                finished: SystemTime::now(),
            };
            tracing::info!(
                target: "switchyard::access",
                status = record.status.as_u16(),
                duration_ms = record.duration.as_millis() as u64,
                "{}",
                template.render(&record)
            );
        }
        response
    }

    /// Absolute URL of the endpoint named `name` (`"resource.binding"`).
    pub fn url(
        &self,
        name: &str,
        params: &Params,
        query: Option<&[(&str, &str)]>,
    ) -> Result<String, ConfigError> {
        let endpoint = self
            .names
            .get(name)
            .ok_or_else(|| ConfigError::UnknownRoute(name.to_string()))?;
        let mut url = endpoint.full_pattern().build(params)?;
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(
                &url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(query)
                    .finish(),
            );
        }
        Ok(url)
    }

    /// Run `provider` and store its output under `key`.
    pub async fn provide<P: Provider>(
        &self,
        key: impl Into<String>,
        provider: P,
    ) -> Result<Arc<P::Output>, Error> {
        let key = key.into();
        let value = provider.provide().await?;
        tracing::debug!(key = %key, "Provider stored value");
        Ok(self.data.insert(key, value))
    }

    pub fn data(&self) -> &Arc<ServiceData> {
        &self.data
    }

    /// Root middleware chain. Mutations relink atomically.
    pub fn chain(&self) -> &Chain {
        self.root.chain()
    }

    /// Append a middleware at runtime.
    pub fn push(&self, middleware: impl Middleware) -> Result<(), ConfigError> {
        self.root.chain().push(middleware)
    }

    /// Remove the middleware at `index` at runtime.
    pub fn pull(&self, index: usize) -> Result<Option<Arc<dyn Middleware>>, ConfigError> {
        self.root.chain().pull_at(index)
    }

    pub fn topology(&self) -> Vec<LinkInfo> {
        self.root.chain().topology()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn names(&self) -> &Arc<RouteNames> {
        &self.names
    }

    pub fn prefix(&self) -> &str {
        self.root.path()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_data_typed_access() {
        let data = ServiceData::new();
        data.insert("db", 42u32);
        assert_eq!(data.get::<u32>("db").as_deref(), Some(&42));
        assert!(data.get::<String>("db").is_none());
        assert!(data.contains("db"));
        assert!(data.remove("db"));
        assert!(data.is_empty());
    }

    struct Settings;

    #[async_trait]
    impl Provider for Settings {
        type Output = Vec<String>;

        async fn provide(&self) -> Result<Self::Output, Error> {
            tokio::task::yield_now().await;
            Ok(vec!["a".into(), "b".into()])
        }
    }

    #[tokio::test]
    async fn test_provider_fills_data() {
        let service = Service::builder().build().unwrap();
        let value = service.provide("settings", Settings).await.unwrap();
        assert_eq!(value.len(), 2);
        assert_eq!(
            service.data().get::<Vec<String>>("settings").unwrap().len(),
            2
        );
    }

    #[test]
    fn test_build_rejects_bad_template() {
        let result = Service::builder()
            .resource(Resource::new("bad").get("/<id:nope>", |_req: Request, _params: Params| async {
                Ok::<_, Error>(Reply::empty())
            }))
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownConverter(_))));
    }
}
