//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define indirection metrics (calls, cache outcomes, HTTP responses)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `indirector_requests_total` (counter): calls by indirection, method
//! - `indirector_cache_lookups_total` (counter): cache reads by outcome
//! - `indirector_http_responses_total` (counter): REST responses by status
//! - `indirector_http_request_duration_seconds` (histogram): REST latency
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for indirection, method, outcome and status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::request::Method;

/// Outcome of a cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Expired,
    Error,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Expired => "expired",
            CacheOutcome::Error => "error",
        }
    }
}

/// Install the Prometheus exporter on the given address.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one call routed through an indirection.
pub fn record_request(indirection: &str, method: Method) {
    metrics::counter!(
        "indirector_requests_total",
        "indirection" => indirection.to_string(),
        "method" => method.as_str()
    )
    .increment(1);
}

/// Record the outcome of a cache read.
pub fn record_cache_lookup(indirection: &str, outcome: CacheOutcome) {
    metrics::counter!(
        "indirector_cache_lookups_total",
        "indirection" => indirection.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a REST response and its latency.
pub fn record_http_response(indirection: &str, status: u16, start: Instant) {
    metrics::counter!(
        "indirector_http_responses_total",
        "indirection" => indirection.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "indirector_http_request_duration_seconds",
        "indirection" => indirection.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
