//! Clients for the fixed governance platform.
//!
//! # Data Flow
//! ```text
//! handlers / registrar
//!     → governance.rs (policies, bundles, assignees, users)
//!     → mlflow.rs (experiments, runs, artifacts, model registry)
//!         → client.rs (base URL, API key header, timeout, status check)
//!             → shared reqwest::Client
//! ```

pub mod client;
pub mod governance;
pub mod mlflow;

pub use client::{UpstreamClient, UpstreamError, API_KEY_HEADER};
pub use governance::GovernanceApi;
pub use mlflow::MlflowClient;
