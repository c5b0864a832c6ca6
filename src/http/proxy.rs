//! Generic forwarding endpoint: `/proxy/{*path}?target=<base URL>`.
//!
//! Lets the browser reach APIs it cannot call directly (CORS, mixed content).
//! One attempt per request, no retries.

use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::error::ApiError;
use crate::http::request::{forwardable_request_headers, request_id, ProxyQuery};
use crate::http::response::relay;
use crate::http::server::AppState;
use crate::observability::metrics;

const MISSING_TARGET: &str = "Missing target URL. Use ?target=https://api.example.com";

/// Resolve `path` against `target` the way a browser resolves a relative link,
/// then append the forwarded query parameters.
pub fn build_upstream_url(
    target: &str,
    path: &str,
    params: &[(String, String)],
) -> Result<Url, ApiError> {
    let base = Url::parse(&format!("{}/", target.trim_end_matches('/')))
        .map_err(|e| ApiError::BadRequest(format!("Invalid target URL '{}': {}", target, e)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported target scheme '{}'",
            base.scheme()
        )));
    }

    let mut url = base
        .join(path)
        .map_err(|e| ApiError::BadRequest(format!("Invalid proxy path '{}': {}", path, e)))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// Forward one request to the caller-supplied target.
pub async fn proxy_request(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(raw_query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let request_id = request_id(&headers).to_string();
    tracing::info!(request_id = %request_id, method = %method, path = %path, "Proxy request");

    if method == Method::OPTIONS {
        metrics::record_proxy_request(method.as_str(), 204, start);
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let query = ProxyQuery::parse(raw_query.as_deref());
    let result = forward(&state, &request_id, method.clone(), &path, query, &headers, body).await;

    let status = match &result {
        Ok(response) => response.status().as_u16(),
        Err(e) => e.status().as_u16(),
    };
    metrics::record_proxy_request(method.as_str(), status, start);
    result
}

async fn forward(
    state: &AppState,
    request_id: &str,
    method: Method,
    path: &str,
    query: ProxyQuery,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let target = query
        .target
        .ok_or_else(|| ApiError::BadRequest(MISSING_TARGET.to_string()))?;
    let upstream_url = build_upstream_url(&target, path, &query.params)?;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        upstream = %upstream_url,
        "Making upstream request"
    );

    let timeout_secs = state.config.proxy.timeout_secs;
    let send = state
        .proxy
        .request(method, upstream_url)
        .headers(forwardable_request_headers(headers))
        .body(body)
        .send();

    // The deadline covers the response head only; the body is bounded by the
    // client's per-read timeout while it streams.
    let upstream = match tokio::time::timeout(Duration::from_secs(timeout_secs), send).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Proxy request failed");
            return Err(ApiError::BadGateway(format!("Proxy request failed: {}", e)));
        }
        Err(_) => {
            tracing::error!(request_id = %request_id, timeout_secs, "Proxy request timed out");
            return Err(ApiError::BadGateway(format!(
                "Proxy request failed: no response within {}s",
                timeout_secs
            )));
        }
    };

    tracing::info!(request_id = %request_id, status = %upstream.status(), "Upstream response");
    relay(upstream, state.config.proxy.error_preview_bytes).await
}
