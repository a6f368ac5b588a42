//! The HTTP channel.
//!
//! Routes are generated from the publisher's `HTTP` view when
//! [`HttpChannel::router`] is called: one path per method, the dotted path
//! with `.` replaced by `/`. `list`, `get`, `search` and `describe` are GET
//! with query-string arguments; everything else is POST with a JSON body
//! (an object for keywords, an array for positionals, empty for none).
//!
//! ```text
//! POST /shop/articles/add   {"name": "pen", "price": 2.5}
//!   200 {"result": {...}}
//!   404 {"error": ..., "available": [...]}     unknown path
//!   422 {"error": ..., "details": [...]}       validation
//!   400 {"error": ...}                         malformed body
//!   500 {"error": ...}                         anything else
//! ```
//!
//! Utility routes: `/_http/health`, `/_http/openapi`, `/_http/metrics`.
//! Root commands visible on `SYS_HTTP` are served as `POST /_publisher/<command>`.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchyard_router::{Args, EntryFilter, MethodSchema, ParamType, RouterError, RouterSchema, ValidationError};

use super::Channel;
use crate::error::PublisherError;
use crate::publisher::Publisher;

/// Methods served over GET.
pub const GET_METHODS: &[&str] = &["list", "get", "search", "describe"];

/// Channel code for the shared publisher API.
const SYS_CODE: &str = "SYS_HTTP";

/// Request counters for `/_http/metrics`.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    total: AtomicU64,
    errors: AtomicU64,
    by_path: Mutex<IndexMap<String, u64>>,
}

impl RequestMetrics {
    pub fn record(&self, path: &str, ok: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        *self.by_path.lock().entry(path.to_string()).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "requests_total": self.total(),
            "errors_total": self.errors(),
            "by_path": *self.by_path.lock(),
        })
    }
}

struct HttpState {
    publisher: Arc<Publisher>,
    metrics: Arc<RequestMetrics>,
}

type SharedState = Arc<HttpState>;

/// Serves a [`Publisher`] over HTTP with axum.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    publisher: Arc<Publisher>,
    metrics: Arc<RequestMetrics>,
}

impl Channel for HttpChannel {
    const NAME: &'static str = "http";
    const CODE: &'static str = "HTTP";
    const DESCRIPTION: &'static str = "JSON over HTTP, one route per published method";
}

/// `shop.articles.add` → `/shop/articles/add`.
pub fn route_path(dotted: &str) -> String {
    format!("/{}", dotted.replace('.', "/"))
}

fn is_get(method: &str) -> bool {
    GET_METHODS.contains(&method)
}

const UTILITY_ROUTES: &[&str] = &["/_http/health", "/_http/openapi", "/_http/metrics"];

/// Rejects a URL that is already routed or that axum would read as a pattern.
fn check_route(url: &str, seen: &mut HashSet<String>) -> Result<(), PublisherError> {
    let reason = if !seen.insert(url.to_string()) {
        "path is already routed"
    } else if url.split('/').skip(1).any(str::is_empty) {
        "empty path segment"
    } else if url
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.contains(['{', '}', '*']))
    {
        "segment uses route pattern syntax"
    } else {
        return Ok(());
    };
    Err(PublisherError::InvalidRoute {
        url: url.to_string(),
        reason,
    })
}

impl HttpChannel {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self {
            publisher,
            metrics: Arc::new(RequestMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<RequestMetrics> {
        &self.metrics
    }

    fn schema(&self) -> RouterSchema {
        self.publisher.describe(&EntryFilter::channel(Self::CODE))
    }

    /// Builds the axum router for the publisher's current tree.
    ///
    /// Fails with [`PublisherError::InvalidRoute`] when two published paths
    /// map to the same URL or a segment contains route pattern syntax.
    pub fn router(&self) -> Result<axum::Router, PublisherError> {
        let state: SharedState = Arc::new(HttpState {
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
        });

        let mut seen: HashSet<String> = UTILITY_ROUTES.iter().map(|url| url.to_string()).collect();
        let mut router = axum::Router::new()
            .route(UTILITY_ROUTES[0], get(health))
            .route(UTILITY_ROUTES[1], get(openapi_handler))
            .route(UTILITY_ROUTES[2], get(metrics_handler));

        let schema = self.schema();
        for (dotted, method) in schema.flatten() {
            let url = route_path(&dotted);
            check_route(&url, &mut seen)?;
            let target = Target {
                path: dotted,
                url: url.clone(),
            };
            router = if is_get(&method.name) {
                router.route(&url, get(query_route(target)))
            } else {
                router.route(&url, post(body_route(target)))
            };
        }

        let system = self.publisher.describe(&EntryFilter::channel(SYS_CODE));
        for name in system.methods.keys() {
            let url = format!("/_publisher/{}", name);
            check_route(&url, &mut seen)?;
            let target = Target {
                path: name.clone(),
                url: url.clone(),
            };
            router = router.route(&url, post(body_route(target)));
        }

        Ok(router.with_state(state))
    }

    /// Binds `addr` and serves until the task is cancelled.
    pub async fn serve(&self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            %addr,
            app = %self.publisher.name(),
            handlers = ?self.publisher.handlers(Self::CODE),
            "http channel listening"
        );
        let router = self.router()?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Method routes
// ----------------------------------------------------------------------

/// A dotted router path and the URL it is served on.
#[derive(Debug, Clone)]
struct Target {
    path: String,
    url: String,
}

type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

fn query_route(
    target: Target,
) -> impl Fn(State<SharedState>, Query<Vec<(String, String)>>) -> ResponseFuture + Clone + Send + Sync + 'static
{
    move |State(state): State<SharedState>, Query(pairs): Query<Vec<(String, String)>>| {
        let args = Args {
            positional: Vec::new(),
            keyword: pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        };
        Box::pin(dispatch(state, target.clone(), Ok(args)))
    }
}

fn body_route(
    target: Target,
) -> impl Fn(State<SharedState>, Bytes) -> ResponseFuture + Clone + Send + Sync + 'static {
    move |State(state): State<SharedState>, body: Bytes| {
        Box::pin(dispatch(state, target.clone(), parse_body(&body)))
    }
}

/// Empty bodies carry no arguments.
fn parse_body(body: &[u8]) -> Result<Args, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Args::new());
    }
    serde_json::from_slice::<Value>(body)
        .map(Args::from_value)
        .map_err(|e| format!("invalid JSON body: {}", e))
}

async fn dispatch(state: SharedState, target: Target, args: Result<Args, String>) -> Response {
    let response = match args {
        Err(message) => error_response(StatusCode::BAD_REQUEST, json!({"error": message})),
        Ok(args) => match state.publisher.call(&target.path, args).await {
            Ok(result) => (StatusCode::OK, Json(json!({"result": result}))).into_response(),
            Err(err) => failure_response(&target.path, &err),
        },
    };
    state.metrics.record(&target.url, response.status().is_success());
    response
}

fn error_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Maps a failed call onto a status and error body.
pub fn failure_response(path: &str, err: &anyhow::Error) -> Response {
    tracing::warn!(%path, error = %err, "http call failed");
    if let Some(err) = err.downcast_ref::<ValidationError>() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": err.to_string(), "details": err.errors}),
        );
    }
    if let Some(err) = err.downcast_ref::<RouterError>() {
        if err.is_resolution() {
            return error_response(
                StatusCode::NOT_FOUND,
                json!({"error": err.to_string(), "available": err.available()}),
            );
        }
    }
    if let Some(err) = err.downcast_ref::<PublisherError>() {
        if matches!(
            err,
            PublisherError::UnknownApp { .. }
                | PublisherError::UnknownSpec { .. }
                | PublisherError::UnknownChannel { .. }
        ) {
            return error_response(
                StatusCode::NOT_FOUND,
                json!({"error": err.to_string(), "available": err.available()}),
            );
        }
    }
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": format!("{:#}", err)}),
    )
}

// ----------------------------------------------------------------------
// Utility routes
// ----------------------------------------------------------------------

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "app": state.publisher.name(),
        "handlers": state.publisher.handlers(HttpChannel::CODE),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn openapi_handler(State(state): State<SharedState>) -> Json<Value> {
    let schema = state.publisher.describe(&EntryFilter::channel(HttpChannel::CODE));
    Json(openapi(state.publisher.name(), &schema))
}

async fn metrics_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(state.metrics.snapshot())
}

fn json_schema(kind: ParamType) -> Value {
    match kind {
        ParamType::Any => json!({}),
        other => json!({"type": other.as_str()}),
    }
}

fn operation(method: &MethodSchema, get: bool) -> Value {
    let mut op = json!({
        "summary": method.description,
        "operationId": method.name,
        "responses": {
            "200": {"description": "Successful response"},
            "422": {"description": "Validation error"},
        },
    });
    if !method.doc.is_empty() {
        op["description"] = json!(method.doc);
    }
    if get {
        let params: Vec<Value> = method
            .params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "in": "query",
                    "required": p.required,
                    "schema": json_schema(p.kind),
                })
            })
            .collect();
        if !params.is_empty() {
            op["parameters"] = json!(params);
        }
    } else {
        let properties: Map<String, Value> = method
            .params
            .iter()
            .map(|p| {
                let mut schema = json_schema(p.kind);
                if let Some(default) = &p.default {
                    schema["default"] = default.clone();
                }
                if let Some(text) = &p.description {
                    schema["description"] = json!(text);
                }
                (p.name.clone(), schema)
            })
            .collect();
        let required: Vec<&str> = method
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        op["requestBody"] = json!({
            "content": {
                "application/json": {
                    "schema": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            }
        });
    }
    op
}

/// OpenAPI 3.0 document for an HTTP-filtered schema.
pub fn openapi(title: &str, schema: &RouterSchema) -> Value {
    let mut paths = Map::new();
    for (dotted, method) in schema.flatten() {
        let get = is_get(&method.name);
        let verb = if get { "get" } else { "post" };
        let mut item = Map::new();
        let mut op = operation(method, get);
        if let Some(tag) = dotted.split('.').next().filter(|_| dotted.contains('.')) {
            op["tags"] = json!([tag]);
        }
        item.insert(verb.to_string(), op);
        paths.insert(route_path(&dotted), Value::Object(item));
    }
    json!({
        "openapi": "3.0.0",
        "info": {
            "title": title,
            "description": schema.description,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_router::{Call, MethodSpec, Param, Router};

    #[test]
    fn test_route_path() {
        assert_eq!(route_path("shop.articles.add"), "/shop/articles/add");
        assert_eq!(route_path("ping"), "/ping");
    }

    #[test]
    fn test_check_route() {
        let mut seen = HashSet::new();
        assert!(check_route("/shop/list", &mut seen).is_ok());
        let err = check_route("/shop/list", &mut seen).unwrap_err();
        assert!(matches!(err, PublisherError::InvalidRoute { reason: "path is already routed", .. }));
        assert!(check_route("/shop/{id}", &mut seen).is_err());
        assert!(check_route("/shop/*rest", &mut seen).is_err());
        assert!(check_route("/shop/:id", &mut seen).is_err());
        assert!(check_route("/shop//list", &mut seen).is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), Args::new());
        assert_eq!(parse_body(b"  \n").unwrap(), Args::new());
        let args = parse_body(br#"{"name": "pen"}"#).unwrap();
        assert_eq!(args.get("name"), Some(&json!("pen")));
        assert!(parse_body(b"{nope").unwrap_err().starts_with("invalid JSON body"));
    }

    #[test]
    fn test_metrics_counts() {
        let metrics = RequestMetrics::default();
        metrics.record("/a", true);
        metrics.record("/a", false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["requests_total"], 2);
        assert_eq!(snapshot["errors_total"], 1);
        assert_eq!(snapshot["by_path"]["/a"], 2);
    }

    #[test]
    fn test_openapi_verbs_and_bodies() {
        let schema = Router::builder("shop")
            .method(
                MethodSpec::new("add")
                    .doc("Add an article.")
                    .param(Param::string("name"))
                    .param(Param::number("price").default(1.0)),
                |_: &(), _call: &mut Call| Ok::<_, anyhow::Error>(Value::Null),
            )
            .method("list", |_: &(), _call: &mut Call| {
                Ok::<_, anyhow::Error>(Value::Null)
            })
            .build()
            .unwrap()
            .schema();
        let doc = openapi("shop", &schema);
        assert_eq!(doc["openapi"], "3.0.0");
        let add = &doc["paths"]["/add"]["post"];
        assert_eq!(add["summary"], "Add an article.");
        assert_eq!(
            add["requestBody"]["content"]["application/json"]["schema"]["required"],
            json!(["name"])
        );
        assert!(doc["paths"]["/list"]["get"].is_object());
    }
}
