//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All handlers produce:
//!     → logging.rs (structured tracing events, request ID in spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (human-readable or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
