//! Governance CRUD pass-through handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::upstream::governance::data_len;
use crate::upstream::UpstreamError;

/// Map an upstream failure to the error body the UI expects.
///
/// A non-success upstream status is relayed; anything else is a 500.
fn upstream_failure(operation: &'static str, action: &str, gerund: &str, error: UpstreamError) -> ApiError {
    metrics::record_upstream_call(operation, false);
    match error {
        UpstreamError::Status { status, body } => {
            tracing::error!(status = %status, body = %body, "Failed to {}", action);
            ApiError::Upstream {
                status,
                message: format!("Failed to {}: {}", action, status.as_u16()),
            }
        }
        other => {
            tracing::error!(error = %other, "Error {}", gerund);
            ApiError::Internal(format!("Error {}: {}", gerund, other))
        }
    }
}

/// `GET /api/policies`
pub async fn get_policies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    tracing::info!("Fetching policies");
    let data = state
        .governance
        .policies()
        .await
        .map_err(|e| upstream_failure("policies", "fetch policies", "fetching policies", e))?;

    metrics::record_upstream_call("policies", true);
    tracing::info!(count = data_len(&data), "Fetched policies");
    Ok(Json(data))
}

/// `GET /api/bundles`
pub async fn get_bundles(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    tracing::info!("Fetching bundles");
    let data = state
        .governance
        .bundles()
        .await
        .map_err(|e| upstream_failure("bundles", "fetch bundles", "fetching bundles", e))?;

    metrics::record_upstream_call("bundles", true);
    tracing::info!(count = data_len(&data), "Fetched bundles");
    Ok(Json(data))
}

/// `PUT /api/bundles/{bundle_id}/stages/{stage_id}/assignee`
///
/// Body `{"assigneeId": ...}`. A missing body, invalid JSON or a falsy id
/// clears the assignee.
pub async fn update_stage_assignee(
    State(state): State<AppState>,
    Path((bundle_id, stage_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let assignee = payload
        .get("assigneeId")
        .filter(|v| is_truthy(v))
        .cloned();

    tracing::info!(bundle_id = %bundle_id, stage_id = %stage_id, "Updating stage assignee");
    let result = state
        .governance
        .set_stage_assignee(&bundle_id, &stage_id, assignee)
        .await
        .map_err(|e| upstream_failure("assignee", "update assignee", "updating assignee", e))?;

    metrics::record_upstream_call("assignee", true);
    Ok(Json(result))
}

/// `GET /api/users`
pub async fn get_users(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    tracing::info!("Fetching users");
    let users = state
        .governance
        .users()
        .await
        .map_err(|e| upstream_failure("users", "fetch users", "fetching users", e))?;

    metrics::record_upstream_call("users", true);
    tracing::info!(count = users.len(), "Fetched users");
    Ok(Json(json!({ "users": users })))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
