//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C / SIGTERM / Shutdown::trigger()
//!     → stop accepting → drain in-flight requests → exit
//! ```

pub mod shutdown;

pub use shutdown::{shutdown_signal, Shutdown};
