//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use governance_console::config::AppConfig;
use governance_console::http::{AppState, HttpServer};
use governance_console::lifecycle::Shutdown;

pub const API_KEY: &str = "test-key";

/// One request seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Handle on a running mock of the governance platform.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Requests whose path starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }
}

async fn record(
    State(log): State<Arc<Mutex<Vec<Recorded>>>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    log.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers.clone(),
        body: bytes.clone(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-domino-api-key")
        .and_then(|v| v.to_str().ok())
        == Some(API_KEY)
}

async fn policies(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    Json(json!({ "data": [{ "id": "p1", "name": "Model Risk" }], "meta": { "total": 1 } }))
        .into_response()
}

async fn bundles() -> Json<Value> {
    Json(json!({ "data": [{ "id": "b1" }, { "id": "b2" }] }))
}

async fn create_bundle(Json(body): Json<Value>) -> Response {
    if body["policyId"] == "closed" {
        return (StatusCode::FORBIDDEN, "policy closed to new bundles").into_response();
    }
    Json(json!({ "id": "bundle-9", "name": body["name"], "policyId": body["policyId"] }))
        .into_response()
}

async fn assignee(Path((bundle, stage)): Path<(String, String)>, Json(body): Json<Value>) -> Response {
    if bundle == "empty" {
        return StatusCode::NO_CONTENT.into_response();
    }
    if bundle == "missing" {
        return (StatusCode::NOT_FOUND, "no such bundle").into_response();
    }
    Json(json!({ "bundleId": bundle, "stageId": stage, "assignee": body["assigneeId"] })).into_response()
}

async fn users() -> Json<Value> {
    Json(json!({ "users": [{ "id": "u1", "userName": "ana" }, { "id": "u2", "userName": "bo" }], "total": 2 }))
}

async fn echo(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let headers: serde_json::Map<String, Value> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
        .collect();
    (
        [("x-upstream", "echo"), ("content-type", "application/json")],
        json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        })
        .to_string(),
    )
        .into_response()
}

async fn fail() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, [("x-upstream", "fail")], "upstream exploded").into_response()
}

/// Five chunks, 400ms apart.
async fn slow() -> Response {
    let chunks = futures_util::stream::unfold(0u8, |n| async move {
        if n == 5 {
            return None;
        }
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        Some((Ok::<_, std::io::Error>(Bytes::from(format!("chunk-{};", n))), n + 1))
    });
    Body::from_stream(chunks).into_response()
}

/// Holds the response head back for three seconds.
async fn stall() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "late"
}

async fn experiment_by_name() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error_code": "RESOURCE_DOES_NOT_EXIST" })),
    )
        .into_response()
}

async fn create_experiment() -> Json<Value> {
    Json(json!({ "experiment_id": "42" }))
}

async fn create_run() -> Json<Value> {
    Json(json!({
        "run": { "info": {
            "run_id": "run-1",
            "experiment_id": "42",
            "artifact_uri": "mlflow-artifacts:/42/run-1/artifacts"
        } }
    }))
}

async fn empty_object() -> Json<Value> {
    Json(json!({}))
}

async fn create_registered_model(Json(body): Json<Value>) -> Response {
    if body["name"] == "existing" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_code": "RESOURCE_ALREADY_EXISTS" })),
        )
            .into_response();
    }
    Json(json!({ "registered_model": { "name": body["name"] } })).into_response()
}

async fn create_model_version(Json(body): Json<Value>) -> Response {
    if body["name"] == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "registry down").into_response();
    }
    Json(json!({ "model_version": { "name": body["name"], "version": "3", "status": "READY" } }))
        .into_response()
}

async fn chat_completion(Json(body): Json<Value>) -> Json<Value> {
    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
    let content = if prompt.contains("riskTier") {
        "```json\n{\"riskTier\": \"Low\", \"unrelated\": 1}\n```"
    } else {
        "no idea"
    };
    Json(json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }))
}

/// Start a mock governance platform (governance API, MLflow, AI gateway, echo).
pub async fn start_mock_upstream() -> MockUpstream {
    let log = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/api/governance/v1/policy-overviews", get(policies))
        .route("/api/governance/v1/bundles", get(bundles).post(create_bundle))
        .route(
            "/api/governance/v1/bundles/{bundle}/stages/{stage}/assignee",
            put(assignee),
        )
        .route("/api/governance/v1/bundles/{bundle}/attachments", post(empty_object))
        .route("/admin/user-management/users", get(users))
        .route("/api/2.0/mlflow/experiments/get-by-name", get(experiment_by_name))
        .route("/api/2.0/mlflow/experiments/create", post(create_experiment))
        .route("/api/2.0/mlflow/runs/create", post(create_run))
        .route("/api/2.0/mlflow/runs/log-batch", post(empty_object))
        .route("/api/2.0/mlflow/runs/update", post(empty_object))
        .route("/api/2.0/mlflow-artifacts/artifacts/{*path}", put(empty_object))
        .route("/api/2.0/mlflow/registered-models/create", post(create_registered_model))
        .route("/api/2.0/mlflow/model-versions/create", post(create_model_version))
        .route("/endpoints/v1/chat/completions", post(chat_completion))
        .route("/echo/{*path}", any(echo))
        .route("/fail", any(fail))
        .route("/slow", get(slow))
        .route("/stall", get(stall))
        .layer(middleware::from_fn_with_state(log.clone(), record));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, log }
}

/// Console configuration pointing every upstream at the mock.
pub fn console_config(upstream: &MockUpstream) -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = Some(upstream.url());
    config.upstream.api_key = API_KEY.into();
    config.upstream.project_id = "proj-1".into();
    config.proxy.timeout_secs = 5;
    config
}

/// Start the console on an ephemeral port.
pub async fn spawn_console(config: AppConfig) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _) = spawn_console_with_state(config).await;
    (addr, shutdown)
}

/// Like [`spawn_console`], also handing back the server's shared state.
pub async fn spawn_console_with_state(config: AppConfig) -> (SocketAddr, Shutdown, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let state = server.state().clone();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown, state)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Read an SSE response to the end and return the decoded `data:` payloads.
pub async fn collect_events(response: reqwest::Response) -> Vec<Value> {
    let text = tokio::time::timeout(Duration::from_secs(10), response.text())
        .await
        .expect("progress stream should end")
        .unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
