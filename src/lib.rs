//! Governance console backend.
//!
//! Serves the web UI, forwards browser calls to arbitrary targets, registers
//! externally-trained models with live progress, and relays governance CRUD
//! to the platform API.

pub mod assist;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod progress;
pub mod registration;
pub mod upstream;

pub use config::AppConfig;
pub use error::ApiError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
