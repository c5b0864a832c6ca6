//! Metrics collection and exposition.
//!
//! # Metrics
//! - `console_proxy_requests_total` (counter): proxied requests by method, status
//! - `console_proxy_request_duration_seconds` (histogram): proxy latency
//! - `console_upstream_requests_total` (counter): governance calls by operation, outcome
//! - `console_registrations_total` (counter): model registrations by outcome
//! - `console_progress_subscribers` (gauge): open progress streams

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one request through the generic proxy.
pub fn record_proxy_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "console_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("console_proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record one call against the governance upstream.
pub fn record_upstream_call(operation: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "console_upstream_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the end of a model registration.
pub fn record_registration(ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!("console_registrations_total", "outcome" => outcome).increment(1);
}

/// Record the number of open progress streams.
pub fn record_progress_subscribers(count: usize) {
    gauge!("console_progress_subscribers").set(count as f64);
}
