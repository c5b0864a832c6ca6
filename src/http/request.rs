//! Request handling and transformation.
//!
//! # Responsibilities
//! - Request ID header and per-request tracing span
//! - Select which client headers may be forwarded upstream
//! - Split the proxy query string into target and forwarded parameters

use axum::http::{header, HeaderMap, HeaderName, Request};
use tracing::Span;

/// Header carrying the request identifier.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Client headers never sent to a proxy target.
///
/// `authorization` is dropped so browser credentials for this console do not
/// leak to arbitrary targets. `accept-encoding` is dropped because bodies are
/// relayed undecoded.
const SKIPPED_REQUEST_HEADERS: [HeaderName; 7] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::AUTHORIZATION,
    header::ACCEPT_ENCODING,
];

/// Request ID of a request, or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Span wrapping each request, tagged with its request ID.
pub fn make_request_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request.headers()),
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// Copy of `headers` without the ones that must not reach a proxy target.
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !SKIPPED_REQUEST_HEADERS.contains(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Proxy query split into the `target` base URL and everything else.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProxyQuery {
    pub target: Option<String>,
    pub params: Vec<(String, String)>,
}

impl ProxyQuery {
    /// Parse a raw query string. The first non-empty `target` wins; every
    /// other pair is kept in order.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut query = ProxyQuery::default();
        let Some(raw) = raw else { return query };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            if key == "target" {
                if query.target.is_none() && !value.is_empty() {
                    query.target = Some(value.into_owned());
                }
            } else {
                query.params.push((key.into_owned(), value.into_owned()));
            }
        }
        query
    }
}
