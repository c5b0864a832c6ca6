//! `POST /assist-governance`: LLM suggestions for governance fields.

use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::assist::{AssistError, AssistRequest};
use crate::error::ApiError;
use crate::http::server::AppState;

impl From<AssistError> for ApiError {
    fn from(error: AssistError) -> Self {
        ApiError::BadGateway(error.to_string())
    }
}

pub async fn assist_governance(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: AssistRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;
    if request.fields.is_empty() {
        return Err(ApiError::BadRequest("No fields to fill".to_string()));
    }

    let suggestions = state.assist.suggest(&request).await.map_err(|e| {
        tracing::error!(error = %e, "Governance assistant failed");
        ApiError::from(e)
    })?;

    tracing::info!(
        requested = request.fields.len(),
        suggested = suggestions.len(),
        "Governance suggestions ready"
    );
    Ok(Json(json!({ "suggestions": suggestions })))
}
