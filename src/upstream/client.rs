//! Authenticated JSON client for the governance platform.

use std::time::Duration;

use axum::body::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

/// Header carrying the platform API key.
pub const API_KEY_HEADER: &str = "X-Domino-Api-Key";

/// Error type for upstream calls.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned {status}")]
    Status { status: StatusCode, body: String },

    #[error("invalid JSON from upstream: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Upstream status when the call completed with a non-success code.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client bound to one base URL and API key.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path (leading slash expected).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
    }

    /// GET a JSON document without query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let no_query: [(&str, &str); 0] = [];
        self.get_json(path, &no_query).await
    }

    /// GET a JSON document.
    pub async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.request(Method::GET, path).query(query).send().await?;
        let bytes = check(response).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// POST a JSON body. `None` when the upstream answers with an empty body.
    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<Option<T>, UpstreamError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, body).await
    }

    /// PUT a JSON body. `None` when the upstream answers with an empty body.
    pub async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<Option<T>, UpstreamError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PUT, path, body).await
    }

    /// PUT raw bytes, e.g. an artifact upload.
    pub async fn put_bytes(
        &self,
        path: &str,
        bytes: Bytes,
        timeout: Duration,
    ) -> Result<(), UpstreamError> {
        let response = self
            .request(Method::PUT, path)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .timeout(timeout)
            .body(bytes)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, UpstreamError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.request(method, path).json(body).send().await?;
        let bytes = check(response).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

async fn check(response: reqwest::Response) -> Result<Bytes, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.bytes().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status { status, body })
}

/// Everything but RFC 3986 unreserved characters is escaped inside a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode one path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
