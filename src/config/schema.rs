//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the console.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the governance console.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Fixed governance upstream.
    pub upstream: UpstreamConfig,

    /// Generic proxy endpoint settings.
    pub proxy: ProxyConfig,

    /// External model registration settings.
    pub registration: RegistrationConfig,

    /// Governance assistant (LLM gateway) settings.
    pub assist: AssistConfig,

    /// Web UI assets.
    pub ui: UiConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Replace the port of the bind address, keeping the host part.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.bind_address = format!("{}:{}", host, port);
    }
}

/// The fixed governance API every CRUD call is forwarded to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Domain of the governance platform (no scheme).
    pub domain: String,

    /// API key sent as `X-Domino-Api-Key`.
    pub api_key: String,

    /// Project the UI runs in.
    pub project_id: String,

    /// Path prefix the UI is served under, handed to the browser.
    pub run_host_path: String,

    /// Full base URL override (e.g. "http://127.0.0.1:9000").
    /// Defaults to `https://{domain}`.
    pub base_url: Option<String>,

    /// Timeout for upstream API calls in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            domain: "govqcexploratory.domino.tech".to_string(),
            api_key: String::new(),
            project_id: String::new(),
            run_host_path: String::new(),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

impl UpstreamConfig {
    /// Base URL of the governance API, without trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.domain.trim_end_matches('/')),
        }
    }
}

/// Generic proxy endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Seconds allowed to connect and receive the response head, and the
    /// longest idle gap tolerated while the body streams.
    pub timeout_secs: u64,

    /// Bytes of an upstream error body copied into the log.
    pub error_preview_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            error_preview_bytes: 1000,
        }
    }
}

/// External model registration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// MLflow tracking server. Defaults to the upstream base URL.
    pub tracking_uri: Option<String>,

    /// Timeout for a single artifact upload in seconds.
    pub upload_timeout_secs: u64,

    /// Experiment name prefix; the model name is appended.
    pub experiment_prefix: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            tracking_uri: None,
            upload_timeout_secs: 600,
            experiment_prefix: "external-model-".to_string(),
        }
    }
}

/// Governance assistant settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Chat completions endpoint. Defaults to
    /// `{upstream}/endpoints/v1/chat/completions`.
    pub endpoint: Option<String>,

    /// Model (gateway endpoint name) to ask.
    pub model: String,

    /// Timeout for the gateway call in seconds.
    pub timeout_secs: u64,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Web UI assets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    /// Index page template.
    pub template_path: String,

    /// Directory served under `/static`.
    pub static_dir: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            template_path: "templates/index.html".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted request body (uploads included).
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 500 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter, used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Address for the Prometheus exporter.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "governance_console=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
