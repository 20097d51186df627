//! Ordered middleware chain and its linked topology.
//!
//! # Responsibilities
//! - Hold the registered middlewares in order (`push`/`pull`)
//! - Relink: compile each node's guard and publish a topology snapshot
//! - Run a request through the snapshot (`Next`)
//!
//! # Design Decisions
//! - Mutations and relinking share one writer lock; readers never lock,
//!   they load the current `Arc<Links>` snapshot
//! - Until the chain is linked into a service, `push` only stages
//! - A failed runtime mutation is rolled back, the old snapshot stays live

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::http::{header, Method, StatusCode};
use futures_util::future::BoxFuture;

use crate::error::{ConfigError, Error, HttpError};
use crate::http::{Reply, Request};
use crate::middleware::Middleware;
use crate::routing::{MatchMode, MethodSet, Miss, Pattern, RouteNames, RouteTable, Router};

/// What a chain needs to know about its position in the service.
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub router: Arc<Router>,
    /// Absolute path prefix of the owning scope.
    pub base: String,
    /// Name of the owning scope, `None` at the root.
    pub over: Option<String>,
    pub names: Arc<RouteNames>,
}

impl LinkContext {
    pub fn root(router: Arc<Router>, names: Arc<RouteNames>) -> Self {
        Self {
            router,
            base: String::new(),
            over: None,
            names,
        }
    }

    /// Context for a scope named `over` mounted at absolute path `base`.
    pub fn child(&self, base: String, over: &str) -> Self {
        Self {
            router: self.router.clone(),
            base,
            over: Some(over.to_string()),
            names: self.names.clone(),
        }
    }
}

/// One node's position in the last linked topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub name: String,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub over: Option<String>,
}

struct Node {
    name: String,
    middleware: Arc<dyn Middleware>,
    guard: Arc<Pattern>,
    methods: MethodSet,
}

impl Node {
    fn admits(&self, request: &Request) -> bool {
        self.methods.accepts(request.method())
            && self
                .guard
                .matches(request.path(), MatchMode::Prefix)
                .is_some()
    }
}

/// Immutable linked snapshot.
#[derive(Default)]
pub(crate) struct Links {
    nodes: Vec<Node>,
    over: Option<String>,
}

/// What runs once the chain is exhausted.
pub(crate) enum Tail {
    NotFound,
    /// Resolve against `table`; a 404 continues with `fallthrough`.
    Dispatch {
        table: Arc<RouteTable>,
        fallthrough: Option<Box<Next>>,
    },
}

impl Tail {
    async fn run(self, request: Request) -> Result<Reply, Error> {
        match self {
            Tail::NotFound => Err(HttpError::not_found().into()),
            Tail::Dispatch { table, fallthrough } => {
                match table.resolve(request.method(), request.path()) {
                    Ok(route) => route.endpoint.invoke(request, route.params).await,
                    Err(Miss::NotFound) => match fallthrough {
                        Some(next) => next.run(request).await,
                        None => Err(HttpError::not_found().into()),
                    },
                    Err(miss) => match fallthrough {
                        Some(next) => after_method_miss(miss, next.run(request).await),
                        None => Err(miss.into_http_error().into()),
                    },
                }
            }
        }
    }
}

/// Settle a local 405 against what the rest of the chain answered for the
/// same request: a reply wins, a 404 keeps the local 405, and a 405 unions
/// both `Allow` sets.
fn after_method_miss(miss: Miss, result: Result<Reply, Error>) -> Result<Reply, Error> {
    match result {
        Err(Error::Http(other)) if other.status() == StatusCode::NOT_FOUND => {
            Err(miss.into_http_error().into())
        }
        Err(Error::Http(other)) if other.status() == StatusCode::METHOD_NOT_ALLOWED => {
            let method = match &miss {
                Miss::MethodNotAllowed { method, .. } => method.clone(),
                Miss::NotFound => Method::GET,
            };
            let later = Miss::MethodNotAllowed {
                method,
                allowed: allowed_methods(&other),
            };
            let mut merged = miss.merge(later).into_http_error();
            for (name, value) in other.headers() {
                if name != header::ALLOW {
                    merged.headers_mut().insert(name.clone(), value.clone());
                }
            }
            Err(merged.into())
        }
        result => result,
    }
}

fn allowed_methods(error: &HttpError) -> Vec<Method> {
    error
        .headers()
        .get_all(header::ALLOW)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| Method::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

/// The remainder of the chain after the current middleware.
pub struct Next {
    links: Arc<Links>,
    cursor: usize,
    tail: Tail,
}

impl Next {
    pub(crate) fn new(links: Arc<Links>, tail: Tail) -> Self {
        Self {
            links,
            cursor: 0,
            tail,
        }
    }

    /// Forward `request` to the next admitting middleware, or to the tail.
    pub fn run(self, request: Request) -> BoxFuture<'static, Result<Reply, Error>> {
        Box::pin(async move {
            let Next {
                links,
                mut cursor,
                tail,
            } = self;
            while let Some(node) = links.nodes.get(cursor) {
                cursor += 1;
                if node.admits(&request) {
                    let middleware = node.middleware.clone();
                    let next = Next {
                        links: links.clone(),
                        cursor,
                        tail,
                    };
                    return middleware.process(request, next).await;
                }
                tracing::trace!(middleware = %node.name, path = %request.path(), "Skipping middleware");
            }
            tail.run(request).await
        })
    }
}

struct Staged {
    entries: Vec<Arc<dyn Middleware>>,
    context: Option<LinkContext>,
}

/// Ordered, mutable sequence of middlewares.
pub struct Chain {
    state: Mutex<Staged>,
    links: ArcSwap<Links>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Staged {
                entries: Vec::new(),
                context: None,
            }),
            links: ArcSwap::from_pointee(Links::default()),
        }
    }

    /// Append `middleware`.
    pub fn push(&self, middleware: impl Middleware) -> Result<(), ConfigError> {
        self.insert(None, Arc::new(middleware))
    }

    /// Insert `middleware` at `index` (clamped to the chain length).
    pub fn push_at(&self, index: usize, middleware: impl Middleware) -> Result<(), ConfigError> {
        self.insert(Some(index), Arc::new(middleware))
    }

    pub fn push_shared(&self, middleware: Arc<dyn Middleware>) -> Result<(), ConfigError> {
        self.insert(None, middleware)
    }

    fn insert(&self, index: Option<usize>, middleware: Arc<dyn Middleware>) -> Result<(), ConfigError> {
        let mut state = self.lock();
        let name = middleware.name();
        if state.entries.iter().any(|m| m.name() == name) {
            return Err(ConfigError::DuplicateMiddleware(name));
        }
        let index = index.map_or(state.entries.len(), |i| i.min(state.entries.len()));
        state.entries.insert(index, middleware);

        if let Some(context) = state.context.clone() {
            if let Err(e) = self.relink(&state) {
                let added = state.entries.remove(index);
                added.unlink(&context);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove the last middleware.
    pub fn pull(&self) -> Result<Option<Arc<dyn Middleware>>, ConfigError> {
        let mut state = self.lock();
        let Some(index) = state.entries.len().checked_sub(1) else {
            return Ok(None);
        };
        self.remove(&mut state, index).map(Some)
    }

    /// Remove the middleware at `index`, if any.
    pub fn pull_at(&self, index: usize) -> Result<Option<Arc<dyn Middleware>>, ConfigError> {
        let mut state = self.lock();
        if index >= state.entries.len() {
            return Ok(None);
        }
        self.remove(&mut state, index).map(Some)
    }

    fn remove(&self, state: &mut Staged, index: usize) -> Result<Arc<dyn Middleware>, ConfigError> {
        let removed = state.entries.remove(index);
        if let Some(context) = state.context.clone() {
            if let Err(e) = self.relink(state) {
                state.entries.insert(index, removed);
                return Err(e);
            }
            removed.unlink(&context);
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.lock().entries.iter().find(|m| m.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().entries.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Attach the chain to its position in the service and relink.
    pub fn link(&self, context: LinkContext) -> Result<(), ConfigError> {
        let mut state = self.lock();
        state.context = Some(context);
        self.relink(&state)
    }

    /// Detach from the service: every middleware releases what it
    /// registered, and later mutations only stage again.
    pub fn unlink(&self) {
        let mut state = self.lock();
        if let Some(context) = state.context.take() {
            for middleware in &state.entries {
                middleware.unlink(&context);
            }
        }
    }

    /// Relink with the current context, or as a standalone root chain.
    pub fn rebuild(&self) -> Result<(), ConfigError> {
        let mut state = self.lock();
        if state.context.is_none() {
            state.context = Some(LinkContext::root(
                Arc::new(Router::new()),
                Arc::new(RouteNames::new()),
            ));
        }
        self.relink(&state)
    }

    fn relink(&self, state: &Staged) -> Result<(), ConfigError> {
        let Some(context) = &state.context else {
            return Ok(());
        };

        let mut nodes: Vec<Node> = Vec::with_capacity(state.entries.len());
        for middleware in &state.entries {
            let name = middleware.name();
            if nodes.iter().any(|n| n.name == name) {
                return Err(ConfigError::DuplicateMiddleware(name));
            }
            middleware.link(context)?;
            let guard = context
                .router
                .pattern(&format!("{}{}", context.base, middleware.path()))?;
            nodes.push(Node {
                name,
                middleware: middleware.clone(),
                guard,
                methods: middleware.methods(),
            });
        }

        tracing::debug!(
            over = context.over.as_deref().unwrap_or("-"),
            base = %context.base,
            nodes = nodes.len(),
            "Relinked middleware chain"
        );
        self.links.store(Arc::new(Links {
            nodes,
            over: context.over.clone(),
        }));
        Ok(())
    }

    /// Per-node view of the current snapshot.
    pub fn topology(&self) -> Vec<LinkInfo> {
        let links = self.links.load();
        let nodes = &links.nodes;
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| LinkInfo {
                name: node.name.clone(),
                prev: i.checked_sub(1).map(|p| nodes[p].name.clone()),
                next: nodes.get(i + 1).map(|n| n.name.clone()),
                over: links.over.clone(),
            })
            .collect()
    }

    /// Run `request` through the chain. Running off the end is a 404.
    pub async fn process(&self, request: Request) -> Result<Reply, Error> {
        self.entry(Tail::NotFound).run(request).await
    }

    pub(crate) fn entry(&self, tail: Tail) -> Next {
        Next::new(self.links.load_full(), tail)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Staged> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode, Uri};

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        trace: Trace,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn process(&self, request: Request, next: Next) -> Result<Reply, Error> {
            self.trace.lock().unwrap().push(format!("{}:in", self.name));
            let result = next.run(request).await;
            self.trace.lock().unwrap().push(format!("{}:out", self.name));
            result
        }
    }

    fn get(path: &'static str) -> Request {
        Request::new(Method::GET, Uri::from_static(path))
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_found() {
        let chain = Chain::new();
        chain.rebuild().unwrap();
        let error = chain.process(get("/")).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_onion_order() {
        let trace = Trace::default();
        let chain = Chain::new();
        for name in ["a", "b"] {
            chain
                .push(Recorder {
                    name,
                    trace: trace.clone(),
                })
                .unwrap();
        }
        let end = trace.clone();
        chain
            .push(from_fn("end", move |_request, _next| {
                end.lock().unwrap().push("end".into());
                async { Ok::<_, Error>(Reply::empty()) }
            }))
            .unwrap();
        chain.rebuild().unwrap();

        chain.process(get("/")).await.unwrap();
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["a:in", "b:in", "end", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn test_guard_skips_middleware() {
        let trace = Trace::default();
        let chain = Chain::new();
        let seen = trace.clone();
        chain
            .push(
                from_fn("admin", move |request, next: Next| {
                    seen.lock().unwrap().push("admin".into());
                    next.run(request)
                })
                .at("/admin"),
            )
            .unwrap();
        chain
            .push(from_fn("ok", |_request, _next| async { Ok::<_, Error>(Reply::empty()) }))
            .unwrap();
        chain.rebuild().unwrap();

        chain.process(get("/public")).await.unwrap();
        assert!(trace.lock().unwrap().is_empty());
        chain.process(get("/admin/users")).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["admin"]);
    }

    #[test]
    fn test_topology_after_mutation() {
        let chain = Chain::new();
        let trace = Trace::default();
        for name in ["a", "b", "c"] {
            chain
                .push(Recorder {
                    name,
                    trace: trace.clone(),
                })
                .unwrap();
        }
        chain.rebuild().unwrap();
        let topology = chain.topology();
        assert_eq!(topology[1].prev.as_deref(), Some("a"));
        assert_eq!(topology[1].next.as_deref(), Some("c"));
        assert_eq!(topology[2].next, None);

        let removed = chain.pull_at(1).unwrap().unwrap();
        assert_eq!(removed.name(), "b");
        let topology = chain.topology();
        assert_eq!(topology.len(), 2);
        assert_eq!(topology[0].next.as_deref(), Some("c"));
        assert_eq!(topology[1].prev.as_deref(), Some("a"));
        assert_eq!(chain.names(), vec!["a", "c"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let chain = Chain::new();
        chain
            .push(from_fn("auth", |request, next: Next| next.run(request)))
            .unwrap();
        let result = chain.push(from_fn("auth", |request, next: Next| next.run(request)));
        assert!(matches!(result, Err(ConfigError::DuplicateMiddleware(_))));
        assert_eq!(chain.len(), 1);
        assert!(chain.get("auth").is_some());
        assert!(chain.get("missing").is_none());
    }

    #[test]
    fn test_failed_runtime_push_rolls_back() {
        let chain = Chain::new();
        chain.rebuild().unwrap();
        let result = chain.push(from_fn("bad", |request, next: Next| next.run(request)).at("/<x:hex>"));
        assert!(matches!(result, Err(ConfigError::UnknownConverter(_))));
        assert!(chain.is_empty());
        assert!(chain.topology().is_empty());
    }

    #[test]
    fn test_method_miss_settles_against_later_answer() {
        let local = || Miss::MethodNotAllowed {
            method: Method::PUT,
            allowed: vec![Method::GET],
        };

        let reply = after_method_miss(local(), Ok(Reply::text("later"))).unwrap();
        assert!(matches!(reply.payload(), crate::http::Payload::Text(t) if t == "later"));

        let error = after_method_miss(local(), Err(HttpError::not_found().into())).unwrap_err();
        let error = error.as_http().unwrap();
        assert_eq!(error.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error.headers()[header::ALLOW], "GET");

        let later = HttpError::method_not_allowed(&Method::PUT, &[Method::POST, Method::GET])
            .with_header(header::HeaderName::from_static("x-request-id"), "r1");
        let error = after_method_miss(local(), Err(later.into())).unwrap_err();
        let error = error.as_http().unwrap();
        assert_eq!(error.headers()[header::ALLOW], "GET, POST");
        assert_eq!(error.headers()["x-request-id"], "r1");

        let error = after_method_miss(local(), Err(HttpError::unauthorized().into())).unwrap_err();
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
    }
}
