//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): gateway requests by method, status, cache
//! - `shield_request_duration_seconds` (histogram): gateway latency
//! - `shield_cache_events_total` (counter): hit / miss / set
//! - `shield_circuit_trips_total` (counter): trips by lock kind
//! - `shield_quota_remaining` / `shield_quota_limit` (gauge): last observed quota
//! - `shield_scheduler_in_flight` / `shield_scheduler_queued` (gauge)
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Labels are low cardinality; paths never become labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("cache", cache),
    ];
    counter!("shield_requests_total", labels.clone()).increment(1);
    histogram!("shield_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn record_cache(op: &'static str) {
    counter!("shield_cache_events_total", "op" => op).increment(1);
}

pub fn record_circuit_trip(lock: &'static str) {
    counter!("shield_circuit_trips_total", "lock" => lock).increment(1);
}

pub fn record_quota(remaining: i64, limit: i64) {
    gauge!("shield_quota_remaining").set(remaining as f64);
    gauge!("shield_quota_limit").set(limit as f64);
}

pub fn record_scheduler(in_flight: usize, queued: usize) {
    gauge!("shield_scheduler_in_flight").set(in_flight as f64);
    gauge!("shield_scheduler_queued").set(queued as f64);
}
