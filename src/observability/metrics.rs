//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (requests, latency, cache results, upstream errors)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `firecloud_requests_total` (counter): requests by method, status
//! - `firecloud_request_duration_seconds` (histogram): end-to-end latency
//! - `firecloud_upstream_duration_seconds` (histogram): per upstream host
//! - `firecloud_upstream_errors_total` (counter): transport failures per host
//! - `firecloud_cache_total` (counter): hit, miss, bypass
//! - `firecloud_serve_errors_total` (counter): handler failures turned into 500s
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Labels for method, status, upstream host

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "firecloud_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("firecloud_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream(host: &str, start: Instant) {
    metrics::histogram!("firecloud_upstream_duration_seconds", "upstream" => host.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(host: &str) {
    metrics::counter!("firecloud_upstream_errors_total", "upstream" => host.to_string()).increment(1);
}

/// `result` is one of `hit`, `miss`, `bypass`.
pub fn record_cache(result: &'static str) {
    metrics::counter!("firecloud_cache_total", "result" => result).increment(1);
}

pub fn record_serve_error() {
    metrics::counter!("firecloud_serve_errors_total").increment(1);
}
