//! Metrics collection and exposition.
//!
//! # Metrics
//! - `eds_clusters` (gauge): cluster records in the cache
//! - `eds_connections` (gauge): open discovery streams
//! - `eds_pushes_total` (counter): responses sent to clients
//! - `eds_push_all_total` (counter): global push sweeps
//! - `eds_push_all_duration_seconds` (histogram): sweep latency
//! - `eds_resolve_errors_total` (counter): registry failures during recomputation
//! - `eds_invalid_endpoints_total` (counter): instances dropped for a bad address
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition runs on its own listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn set_cluster_count(count: usize) {
    metrics::gauge!("eds_clusters").set(count as f64);
}

pub fn connection_opened() {
    metrics::gauge!("eds_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("eds_connections").decrement(1.0);
}

pub fn record_push() {
    metrics::counter!("eds_pushes_total").increment(1);
}

pub fn record_push_all(elapsed: Duration) {
    metrics::counter!("eds_push_all_total").increment(1);
    metrics::histogram!("eds_push_all_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_resolve_error() {
    metrics::counter!("eds_resolve_errors_total").increment(1);
}

pub fn record_invalid_endpoint() {
    metrics::counter!("eds_invalid_endpoints_total").increment(1);
}
