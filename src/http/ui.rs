//! Web UI: index page, platform health probes.

use axum::{extract::State, http::StatusCode, response::Html};
use serde_json::json;

use crate::config::UpstreamConfig;
use crate::error::ApiError;
use crate::http::server::AppState;

/// Placeholder in the index template replaced with the browser config.
pub const CONFIG_PLACEHOLDER: &str = "{{ DOMINO_CONFIG }}";

/// Browser-side configuration, embeddable inside a `<script>` element.
pub fn browser_config(upstream: &UpstreamConfig) -> String {
    let config = json!({
        "PROJECT_ID": upstream.project_id,
        "RUN_HOST_PATH": upstream.run_host_path,
        "API_BASE": upstream.domain,
        "API_KEY": upstream.api_key,
    });
    config
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

pub fn render_index(template: &str, upstream: &UpstreamConfig) -> String {
    template.replace(CONFIG_PLACEHOLDER, &browser_config(upstream))
}

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let path = &state.config.ui.template_path;
    let template = tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!(path = %path, error = %e, "Index template unavailable");
        ApiError::Internal(format!("Index template unavailable: {}", e))
    })?;
    Ok(Html(render_index(&template, &state.config.upstream)))
}

/// `GET /_stcore/health`
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /_stcore/host-config`
pub async fn host_config() -> StatusCode {
    StatusCode::OK
}
