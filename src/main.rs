//! Governance console.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!   Browser               │              GOVERNANCE CONSOLE              │
//!   ──────────────────────┼─▶ ui          /, /static, /_stcore/*         │
//!                         │   proxy       /proxy/{*path}?target= ────────┼──▶ any target
//!                         │   governance  /api/* ────────────────────────┼──▶ governance API
//!                         │   registration /register-external-model ─────┼──▶ MLflow + governance
//!                         │        │ publishes                           │
//!                         │        ▼                                     │
//!   ◀─────────────────────┼── progress    /register-progress/{id} (SSE)  │
//!                         │   assist      /assist-governance ────────────┼──▶ AI gateway
//!                         │                                              │
//!                         │   config · observability · lifecycle         │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use governance_console::config::load_config;
use governance_console::http::HttpServer;
use governance_console::lifecycle::Shutdown;
use governance_console::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "governance-console")]
#[command(about = "Web backend for model governance and external model registration", long_about = None)]
struct Args {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding configuration and PORT.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.listener.set_port(port);
    }

    logging::init_tracing(&config.observability);
    tracing::info!("governance-console v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        domain = %config.upstream.domain,
        base_url = %config.upstream.base_url(),
        api_key = logging::redact(&config.upstream.api_key),
        project_id = %config.upstream.project_id,
        bind_address = %config.listener.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
