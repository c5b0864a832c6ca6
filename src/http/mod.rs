//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, body limit)
//!     → ui.rs          /, /static, /_stcore/*
//!     → proxy.rs       /proxy/{*path}
//!         → request.rs (header filter, query split)
//!         → response.rs (hop-by-hop strip, relay)
//!     → governance.rs  /api/*
//!     → registration.rs /register-external-model
//!     → progress.rs    /register-progress/{id} (SSE)
//!     → assist.rs      /assist-governance
//! ```

pub mod assist;
pub mod governance;
pub mod progress;
pub mod proxy;
pub mod registration;
pub mod request;
pub mod response;
pub mod server;
pub mod ui;

pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
