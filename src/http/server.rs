//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared clients and application state
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve on a listener until shutdown

use std::time::Duration;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, on, post, put, MethodFilter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::assist::AssistClient;
use crate::config::AppConfig;
use crate::http::request::make_request_span;
use crate::http::{assist, governance, progress, proxy, registration, ui};
use crate::lifecycle::shutdown_signal;
use crate::progress::ProgressHub;
use crate::registration::Registrar;
use crate::upstream::{GovernanceApi, MlflowClient, UpstreamClient};

const USER_AGENT: &str = concat!("governance-console/", env!("CARGO_PKG_VERSION"));

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Outbound client for the generic proxy. Its timeouts bound connecting
    /// and each read, so long streamed bodies are relayed in full.
    pub proxy: reqwest::Client,
    pub governance: GovernanceApi,
    pub registrar: Registrar,
    pub assist: AssistClient,
    pub progress: ProgressHub,
}

impl AppState {
    /// Build every client from configuration.
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        let proxy_timeout = Duration::from_secs(config.proxy.timeout_secs);
        let proxy = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(proxy_timeout)
            .read_timeout(proxy_timeout)
            .build()?;

        let base_url = config.upstream.base_url();
        let upstream = UpstreamClient::new(
            http.clone(),
            base_url.clone(),
            config.upstream.api_key.clone(),
            Duration::from_secs(config.upstream.timeout_secs),
        );
        let governance = GovernanceApi::new(upstream.clone());

        let tracking = UpstreamClient::new(
            http.clone(),
            config
                .registration
                .tracking_uri
                .clone()
                .unwrap_or_else(|| base_url.clone()),
            config.upstream.api_key.clone(),
            Duration::from_secs(config.upstream.timeout_secs),
        );
        let registrar = Registrar::new(
            MlflowClient::new(
                tracking,
                Duration::from_secs(config.registration.upload_timeout_secs),
            ),
            governance.clone(),
            config.registration.experiment_prefix.clone(),
            Some(config.upstream.project_id.clone()),
        );

        let assist = AssistClient::new(
            http.clone(),
            config
                .assist
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("{}/endpoints/v1/chat/completions", base_url)),
            config.upstream.api_key.clone(),
            config.assist.model.clone(),
            Duration::from_secs(config.assist.timeout_secs),
        );

        Ok(Self {
            config: Arc::new(config),
            proxy,
            governance,
            registrar,
            assist,
            progress: ProgressHub::new(),
        })
    }
}

/// HTTP server for the governance console.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let state = AppState::new(config)?;
        let router = build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Run the server until Ctrl+C, SIGTERM or a message on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let proxy_methods = MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH)
        .or(MethodFilter::OPTIONS);

    Router::new()
        .route("/", get(ui::index))
        .route("/_stcore/health", get(ui::health))
        .route("/_stcore/host-config", get(ui::host_config))
        .route("/register-progress/{request_id}", get(progress::register_progress))
        .route("/proxy/{*path}", on(proxy_methods, proxy::proxy_request))
        .route("/register-external-model", post(registration::register_external_model))
        .route("/assist-governance", post(assist::assist_governance))
        .route("/api/policies", get(governance::get_policies))
        .route("/api/bundles", get(governance::get_bundles))
        .route(
            "/api/bundles/{bundle_id}/stages/{stage_id}/assignee",
            put(governance::update_stage_assignee),
        )
        .route("/api/users", get(governance::get_users))
        .nest_service("/static", ServeDir::new(&config.ui.static_dir))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
