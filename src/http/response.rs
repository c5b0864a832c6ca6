//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from upstream responses
//! - Relay upstream bodies: buffered for errors, streamed otherwise

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Upstream response headers that describe the upstream connection, not the payload.
const HOP_BY_HOP_RESPONSE_HEADERS: [HeaderName; 3] = [
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
];

/// Copy of upstream headers safe to send to the client.
pub fn relayable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP_RESPONSE_HEADERS.contains(name) {
            relayed.append(name.clone(), value.clone());
        }
    }
    relayed
}

/// Lossy UTF-8 preview of at most `limit` bytes.
pub fn body_preview(body: &[u8], limit: usize) -> String {
    String::from_utf8_lossy(&body[..body.len().min(limit)]).into_owned()
}

/// Turn an upstream response into a client response.
///
/// Error statuses are buffered so the body can be logged; everything else is
/// streamed through.
pub async fn relay(
    upstream: reqwest::Response,
    preview_bytes: usize,
) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = relayable_response_headers(upstream.headers());

    if status.as_u16() >= 400 {
        let body = upstream.bytes().await.map_err(|e| {
            tracing::error!(error = %e, "Error reading upstream error response");
            ApiError::BadGateway(format!("Proxy request failed: {}", e))
        })?;
        tracing::error!(
            status = %status,
            body = %body_preview(&body, preview_bytes),
            "Upstream error response"
        );
        return Ok((status, headers, Body::from(body)).into_response());
    }

    let body = Body::from_stream(upstream.bytes_stream());
    Ok((status, headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hop_by_hop_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let relayed = relayable_response_headers(&headers);
        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed[header::CONTENT_TYPE], "text/csv");
        assert_eq!(relayed[header::CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn test_body_preview() {
        assert_eq!(body_preview(b"abcdef", 3), "abc");
        assert_eq!(body_preview(b"ab", 10), "ab");
        assert_eq!(body_preview(&[0x66, 0xff, 0x6f], 3), "f\u{fffd}o");
    }
}
