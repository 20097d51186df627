//! End-to-end behaviour of a built service, without a socket.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{header, Method, StatusCode};
use switchyard::http::X_REQUEST_ID;
use switchyard::routing::{Converter, Params};
use switchyard::{
    from_fn, ConfigError, Error, HttpError, Middleware, Next, Reply, Request, RequestId,
    Resource, Scope, Service,
};
use tokio::sync::oneshot;

mod common;

async fn read(_request: Request, params: Params) -> Result<serde_json::Value, Error> {
    Ok(params.to_json())
}

fn comment_service() -> Service {
    Service::builder()
        .resource(Resource::new("Comment").get("/<key:int>", read).named("read"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_comment_read() {
    let service = comment_service();
    let response = service.handle(common::get("/comment/42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        common::body_json(response).await,
        serde_json::json!({"key": 42})
    );
}

#[tokio::test]
async fn test_conversion_failure_is_not_found() {
    let service = comment_service();
    let response = service.handle(common::get("/comment/abc")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = common::body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_method_is_405_with_allow() {
    let service = comment_service();
    let response = service
        .handle(common::request(Method::DELETE, "/comment/42"))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET");
}

#[tokio::test]
async fn test_internal_error_does_not_leak() {
    let service = Service::builder()
        .resource(Resource::new("boom").get("", |_request: Request, _params: Params| async {
            Err::<Reply, Error>(Error::internal("database password is hunter2"))
        }))
        .build()
        .unwrap();

    let response = service.handle(common::get("/boom")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_text(response).await;
    assert!(!body.contains("hunter2"));
}

#[tokio::test]
async fn test_panic_becomes_500() {
    let service = Service::builder()
        .resource(Resource::new("panic").get("", |_request: Request, _params: Params| async {
            if true {
                panic!("secret panic detail");
            }
            Ok::<_, Error>(Reply::empty())
        }))
        .build()
        .unwrap();

    let response = service.handle(common::get("/panic")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!common::body_text(response).await.contains("secret"));
}

type Trace = Arc<Mutex<Vec<String>>>;

struct Tracer {
    name: &'static str,
    trace: Trace,
}

#[async_trait]
impl Middleware for Tracer {
    fn name(&self) -> String {
        self.name.to_string()
    }

    async fn process(&self, request: Request, next: Next) -> Result<Reply, Error> {
        self.trace.lock().unwrap().push(format!("{}>", self.name));
        let result = next.run(request).await;
        self.trace.lock().unwrap().push(format!("<{}", self.name));
        result
    }
}

async fn onion(order: [&'static str; 2]) -> Vec<String> {
    let trace = Trace::default();
    let handler_trace = trace.clone();
    let mut builder = Service::builder();
    for name in order {
        builder = builder.middleware(Tracer {
            name,
            trace: trace.clone(),
        });
    }
    let service = builder
        .resource(Resource::new("x").get("", move |_request: Request, _params: Params| {
            let trace = handler_trace.clone();
            async move {
                trace.lock().unwrap().push("handler".into());
                Ok::<_, Error>(Reply::empty())
            }
        }))
        .build()
        .unwrap();

    let response = service.handle(common::get("/x")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = trace.lock().unwrap().clone();
    result
}

#[tokio::test]
async fn test_onion_ordering_is_not_commutative() {
    assert_eq!(onion(["a", "b"]).await, vec!["a>", "b>", "handler", "<b", "<a"]);
    assert_eq!(onion(["b", "a"]).await, vec!["b>", "a>", "handler", "<a", "<b"]);
}

#[tokio::test]
async fn test_middleware_short_circuit_and_rescue() {
    let service = Service::builder()
        .middleware(from_fn("rescue", |request, next: Next| async move {
            match next.run(request).await {
                Err(Error::Http(e)) if e.status() == StatusCode::UNAUTHORIZED => {
                    Ok(Reply::text("login first").with_status(StatusCode::UNAUTHORIZED))
                }
                other => other,
            }
        }))
        .middleware(from_fn("deny", |_request, _next| async {
            Err::<Reply, Error>(HttpError::unauthorized().into())
        }))
        .resource(Resource::new("x").get("", read))
        .build()
        .unwrap();

    let response = service.handle(common::get("/x")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(common::body_text(response).await, "login first");
}

#[tokio::test]
async fn test_created_has_headers_and_no_body() {
    let service = Service::builder()
        .resource(Resource::new("comment").post("", |_request: Request, _params: Params| async {
            Err::<Reply, Error>(
                HttpError::created()
                    .with_header(header::LOCATION, "/comment/1")
                    .into(),
            )
        }))
        .build()
        .unwrap();

    let response = service
        .handle(common::request(Method::POST, "/comment"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/comment/1");
    assert!(common::body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_prefix_nested_scope_and_url() {
    let auth = from_fn("auth", |request: Request, next: Next| async move {
        if request.header("authorization").is_none() {
            return Err(HttpError::unauthorized().into());
        }
        next.run(request).await
    })
    .with_methods(switchyard::MethodSet::only(Method::POST));

    let comment = Scope::new("comment", "/comment")
        .middleware(auth)
        .unwrap()
        .resource(
            Resource::new("comment")
                .at("")
                .get("/key=<key:myint>", read)
                .named("read")
                .post("", |_request: Request, _params: Params| async {
                    Ok::<_, Error>((StatusCode::ACCEPTED, "queued"))
                }),
        );

    let service = Service::builder()
        .prefix("/api/v1")
        .converter("myint", Converter::integer("[1-9][0-9]*"))
        .scope(comment)
        .build()
        .unwrap();

    let response = service.handle(common::get("/api/v1/comment/key=7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_json(response).await, serde_json::json!({"key": 7}));

    // `myint` rejects a leading zero.
    let response = service.handle(common::get("/api/v1/comment/key=07")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = service
        .handle(common::request(Method::POST, "/api/v1/comment"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = common::with_header(
        common::request(Method::POST, "/api/v1/comment"),
        "authorization",
        "Bearer t",
    );
    let response = service.handle(request).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let params: Params = [("key", 7i64)].into_iter().collect();
    assert_eq!(
        service.url("comment.read", &params, None).unwrap(),
        "/api/v1/comment/key=7"
    );
    assert_eq!(
        service
            .url("comment.read", &params, Some(&[("q", "a b")]))
            .unwrap(),
        "/api/v1/comment/key=7?q=a+b"
    );
    assert!(service.url("comment.missing", &params, None).is_err());

    // Outside the prefix nothing matches.
    let response = service.handle(common::get("/comment/key=7")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_runtime_push_and_pull() {
    let service = comment_service();
    service
        .push(from_fn("teapot", |_request, _next| async {
            Err::<Reply, Error>(HttpError::from_status(StatusCode::IM_A_TEAPOT).into())
        }))
        .unwrap();
    assert_eq!(service.topology().len(), 1);

    let response = service.handle(common::get("/comment/1")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    let removed = service.pull(0).unwrap().unwrap();
    assert_eq!(removed.name(), "teapot");
    let response = service.handle(common::get("/comment/1")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_head_has_no_body() {
    let service = Service::builder()
        .resource(Resource::new("ping").head("", read).get("", read))
        .build()
        .unwrap();
    let response = service.handle(common::request(Method::HEAD, "/ping")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(common::body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_request_id_and_service_data() {
    let service = Service::builder()
        .middleware(RequestId)
        .resource(Resource::new("greeting").get("", |request: Request, _params: Params| async move {
            let data = request.service_data().cloned();
            let greeting = data
                .and_then(|d| d.get::<String>("greeting"))
                .map(|g| g.as_str().to_string())
                .unwrap_or_default();
            Ok::<_, Error>(serde_json::json!({
                "greeting": greeting,
                "id": request.request_id(),
            }))
        }))
        .build()
        .unwrap();
    service.data().insert("greeting", "hello".to_string());

    let request = common::with_header(common::get("/greeting"), "x-request-id", "req-1");
    let response = service.handle(request).await;
    assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "req-1");
    assert_eq!(
        common::body_json(response).await,
        serde_json::json!({"greeting": "hello", "id": "req-1"})
    );
}

#[tokio::test]
async fn test_missing_required_header_is_400() {
    let service = Service::builder()
        .resource(
            Resource::new("secure")
                .get("", read)
                .require_header(header::HeaderName::from_static("x-token")),
        )
        .build()
        .unwrap();

    let response = service.handle(common::get("/secure")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = common::with_header(common::get("/secure"), "x-token", "t");
    let response = service.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_scope_method_miss_consults_later_routes() {
    let inner = Scope::new("inner", "/x").resource(Resource::new("a").get("", read));
    let service = Service::builder()
        .scope(inner)
        .resource(Resource::new("b").at("/x/a").post("", |_request: Request, _params: Params| async {
            Ok::<_, Error>(Reply::text("posted"))
        }))
        .build()
        .unwrap();

    let response = service.handle(common::request(Method::POST, "/x/a")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_text(response).await, "posted");

    let response = service.handle(common::get("/x/a")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = service.handle(common::request(Method::PUT, "/x/a")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, POST");
}

fn api_scope() -> Scope {
    Scope::new("api", "/api").resource(Resource::new("item").get("/<id:int>", read).named("read"))
}

#[tokio::test]
async fn test_pulled_scope_releases_route_names() {
    let service = Service::builder().build().unwrap();
    let params: Params = [("id", 3i64)].into_iter().collect();

    service.push(api_scope()).unwrap();
    assert_eq!(service.url("item.read", &params, None).unwrap(), "/api/item/3");
    let response = service.handle(common::get("/api/item/3")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let removed = service.pull(0).unwrap().unwrap();
    assert_eq!(removed.name(), "api");
    let response = service.handle(common::get("/api/item/3")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(matches!(
        service.url("item.read", &params, None),
        Err(ConfigError::UnknownRoute(_))
    ));

    // The same names can be bound again.
    service.push(api_scope()).unwrap();
    assert_eq!(service.url("item.read", &params, None).unwrap(), "/api/item/3");
    let response = service.handle(common::get("/api/item/3")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_failed_push_leaves_no_route_names() {
    let service = Service::builder().build().unwrap();

    let clashing = Scope::new("a", "/api")
        .resource(Resource::new("a").at("/x").get("", read).named("r"))
        .resource(Resource::new("a").at("/y").get("", read).named("r"));
    assert!(matches!(
        service.push(clashing),
        Err(ConfigError::DuplicateRoute(_))
    ));
    assert!(service.topology().is_empty());
    assert!(service.url("a.r", &Params::new(), None).is_err());

    // A clash in a nested scope also releases the outer scope's names.
    let outer = Scope::new("outer", "/o")
        .resource(Resource::new("o").get("", read).named("r"))
        .scope(
            Scope::new("inner", "/i")
                .resource(Resource::new("d").at("/1").get("", read).named("r"))
                .resource(Resource::new("d").at("/2").get("", read).named("r")),
        )
        .unwrap();
    assert!(service.push(outer).is_err());
    assert!(service.url("o.r", &Params::new(), None).is_err());
    assert!(service.names().is_empty());

    service
        .push(Scope::new("a", "/api").resource(Resource::new("a").at("/x").get("", read).named("r")))
        .unwrap();
    assert_eq!(service.url("a.r", &Params::new(), None).unwrap(), "/api/x");
}

#[tokio::test]
async fn test_paths_are_matched_percent_decoded() {
    let service = Service::builder()
        .resource(Resource::new("user").get("/<name>", read))
        .resource(Resource::new("cafe").at("/café").get("", read))
        .build()
        .unwrap();

    let response = service.handle(common::get("/user/ada%20lovelace")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        common::body_json(response).await,
        serde_json::json!({"name": "ada lovelace"})
    );

    let response = service.handle(common::get("/caf%C3%A9")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_in_flight_request_keeps_its_topology() {
    let (entered_tx, entered_rx) = oneshot::channel::<()>();
    let (resume_tx, resume_rx) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some((entered_tx, resume_rx))));

    let service = Arc::new(
        Service::builder()
            .middleware(from_fn("gate", move |request, next: Next| {
                let held = gate.lock().unwrap().take();
                async move {
                    if let Some((entered, resume)) = held {
                        let _ = entered.send(());
                        let _ = resume.await;
                    }
                    next.run(request).await
                }
            }))
            .resource(Resource::new("x").get("", read))
            .build()
            .unwrap(),
    );

    let in_flight = tokio::spawn({
        let service = service.clone();
        async move { service.handle(common::get("/x")).await }
    });
    entered_rx.await.unwrap();

    service
        .push(from_fn("teapot", |_request, _next| async {
            Err::<Reply, Error>(HttpError::from_status(StatusCode::IM_A_TEAPOT).into())
        }))
        .unwrap();
    service.pull(0).unwrap().unwrap();
    let names: Vec<_> = service.topology().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["teapot"]);

    let response = service.handle(common::get("/x")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    resume_tx.send(()).unwrap();
    let response = in_flight.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
