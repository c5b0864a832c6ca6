//! Governance pass-through routes, UI page and health probes.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt;

use governance_console::http::{build_router, AppState};

use common::{client, console_config, spawn_console, start_mock_upstream, API_KEY};

#[tokio::test]
async fn test_policies_passed_through_with_api_key() {
    let upstream = start_mock_upstream().await;
    let (addr, shutdown) = spawn_console(console_config(&upstream)).await;

    let response = client()
        .get(format!("http://{}/api/policies", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"][0]["name"], "Model Risk");
    assert_eq!(body["meta"]["total"], 1);

    let recorded = upstream.requests_to("/api/governance/v1/policy-overviews");
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].headers["x-domino-api-key"], API_KEY);

    shutdown.trigger();
}

#[tokio::test]
async fn test_rejected_key_relays_status() {
    let upstream = start_mock_upstream().await;
    let mut config = console_config(&upstream);
    config.upstream.api_key = "wrong".into();
    let (addr, shutdown) = spawn_console(config).await;

    let response = client()
        .get(format!("http://{}/api/policies", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to fetch policies: 401" }));

    shutdown.trigger();
}

#[tokio::test]
async fn test_bundles_passed_through() {
    let upstream = start_mock_upstream().await;
    let (addr, shutdown) = spawn_console(console_config(&upstream)).await;

    let body: Value = client()
        .get(format!("http://{}/api/bundles", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_users_wrapped_and_paged() {
    let upstream = start_mock_upstream().await;
    let (addr, shutdown) = spawn_console(console_config(&upstream)).await;

    let response = client()
        .get(format!("http://{}/api/users", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert_eq!(body["users"][1]["userName"], "bo");
    assert!(body.get("total").is_none());

    let recorded = upstream.requests_to("/admin/user-management/users");
    assert_eq!(recorded[0].query.as_deref(), Some("limit=500&offset=0"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_assign_and_clear_stage_assignee() {
    let upstream = start_mock_upstream().await;
    let (addr, shutdown) = spawn_console(console_config(&upstream)).await;
    let http = client();

    let response = http
        .put(format!("http://{}/api/bundles/b1/stages/s2/assignee", addr))
        .json(&json!({ "assigneeId": "u1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["bundleId"], "b1");
    assert_eq!(body["stageId"], "s2");
    assert_eq!(body["assignee"], "u1");

    // Empty id clears the assignee.
    http.put(format!("http://{}/api/bundles/b1/stages/s2/assignee", addr))
        .json(&json!({ "assigneeId": "" }))
        .send()
        .await
        .unwrap();

    let sent: Vec<Value> = upstream
        .requests_to("/api/governance/v1/bundles/b1/stages/s2/assignee")
        .iter()
        .map(|r| r.json())
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["assigneeId"], "u1");
    assert_eq!(sent[1]["assigneeId"], Value::Null);

    shutdown.trigger();
}

#[tokio::test]
async fn test_empty_assignee_response_reports_success() {
    let upstream = start_mock_upstream().await;
    let (addr, shutdown) = spawn_console(console_config(&upstream)).await;

    let response = client()
        .put(format!("http://{}/api/bundles/empty/stages/s1/assignee", addr))
        .json(&json!({ "assigneeId": "u2" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "success": true }));

    let response = client()
        .put(format!("http://{}/api/bundles/missing/stages/s1/assignee", addr))
        .json(&json!({ "assigneeId": "u2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Failed to update assignee: 404");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_platform_is_internal_error() {
    let upstream = start_mock_upstream().await;
    let mut config = console_config(&upstream);
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.upstream.base_url = Some(format!("http://{}", closed.local_addr().unwrap()));
    drop(closed);
    let (addr, shutdown) = spawn_console(config).await;

    let response = client()
        .get(format!("http://{}/api/bundles", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error fetching bundles:"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_probes() {
    let upstream = start_mock_upstream().await;
    let router = build_router(AppState::new(console_config(&upstream)).unwrap());

    for path in ["/_stcore/health", "/_stcore/host-config"] {
        let response = router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert!(response.headers().contains_key("x-request-id"));
    }
}

#[tokio::test]
async fn test_index_renders_browser_config() {
    let upstream = start_mock_upstream().await;
    let template = std::env::temp_dir().join(format!("console-index-{}.html", uuid::Uuid::new_v4()));
    std::fs::write(&template, "<script>window.DOMINO = {{ DOMINO_CONFIG }};</script>").unwrap();

    let mut config = console_config(&upstream);
    config.ui.template_path = template.to_string_lossy().into_owned();
    config.upstream.run_host_path = "/apps/console".into();
    let router = build_router(AppState::new(config).unwrap());

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("\"PROJECT_ID\":\"proj-1\""));
    assert!(html.contains("\"RUN_HOST_PATH\":\"/apps/console\""));
    assert!(!html.contains("{{ DOMINO_CONFIG }}"));

    std::fs::remove_file(template).ok();
}

#[tokio::test]
async fn test_missing_template_is_internal_error() {
    let upstream = start_mock_upstream().await;
    let mut config = console_config(&upstream);
    config.ui.template_path = "/nonexistent/index.html".into();
    let router = build_router(AppState::new(config).unwrap());

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
