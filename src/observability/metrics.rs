//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_validations_total` (counter): fast validations by outcome
//! - `gateway_jobs_total` (counter): pipeline jobs by terminal outcome
//! - `gateway_job_retries_total` (counter): settlement retries
//! - `gateway_settlement_duration_seconds` (histogram): chain submission latency
//! - `gateway_cache_hits_total` / `gateway_cache_misses_total` (counters)
//! - `gateway_cache_entries` (gauge): live cache entry count
//! - `gateway_notifications_total` (counter): dispatched notifications by kind
//! - `gateway_ws_connections` (gauge): open realtime connections

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on the given address.
///
/// Exporter failures are logged, not fatal: the gateway keeps serving
/// payments without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a fast-validation outcome.
pub fn record_validation(outcome: &'static str) {
    metrics::counter!("gateway_validations_total", "outcome" => outcome).increment(1);
}

/// Record a pipeline job reaching a terminal outcome.
pub fn record_job(outcome: &'static str) {
    metrics::counter!("gateway_jobs_total", "outcome" => outcome).increment(1);
}

/// Record a settlement retry being scheduled.
pub fn record_job_retry() {
    metrics::counter!("gateway_job_retries_total").increment(1);
}

/// Record the latency of one settlement submission.
pub fn record_settlement_duration(start: Instant) {
    metrics::histogram!("gateway_settlement_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a cache hit or miss.
pub fn record_cache_access(hit: bool) {
    if hit {
        metrics::counter!("gateway_cache_hits_total").increment(1);
    } else {
        metrics::counter!("gateway_cache_misses_total").increment(1);
    }
}

/// Record the live cache entry count.
pub fn record_cache_size(entries: usize) {
    metrics::gauge!("gateway_cache_entries").set(entries as f64);
}

/// Record a dispatched notification.
pub fn record_notification(kind: &'static str) {
    metrics::counter!("gateway_notifications_total", "kind" => kind).increment(1);
}

/// Record a realtime connection being opened or closed.
pub fn record_ws_connections(open: usize) {
    metrics::gauge!("gateway_ws_connections").set(open as f64);
}
