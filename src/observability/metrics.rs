//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_outbound_requests_total` (counter): platform, outcome
//! - `gateway_outbound_request_duration_seconds` (histogram): platform
//! - `gateway_retries_total` (counter): platform
//! - `gateway_circuit_state` (gauge): service; 0=closed, 1=half-open, 2=open
//! - `gateway_circuit_rejections_total` (counter): service
//! - `gateway_security_events_total` (counter): platform, kind
//! - `gateway_rate_limit_flags_total` (counter): platform
//! - `gateway_credential_operations_total` (counter): operation
//! - `gateway_webhooks_total` (counter): platform, outcome
//! - `gateway_orders_synced_total` (counter): platform
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Labels are bounded: platform names, fixed outcome strings

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outbound_request(platform: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "gateway_outbound_requests_total",
        "platform" => platform.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "gateway_outbound_request_duration_seconds",
        "platform" => platform.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_retry(platform: &str) {
    counter!("gateway_retries_total", "platform" => platform.to_string()).increment(1);
}

pub fn record_circuit_state(service: &str, state: f64) {
    gauge!("gateway_circuit_state", "service" => service.to_string()).set(state);
}

pub fn record_circuit_rejection(service: &str) {
    counter!("gateway_circuit_rejections_total", "service" => service.to_string()).increment(1);
}

pub fn record_security_event(platform: &str, kind: &'static str) {
    counter!(
        "gateway_security_events_total",
        "platform" => platform.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_rate_limited(platform: &str) {
    counter!("gateway_rate_limit_flags_total", "platform" => platform.to_string()).increment(1);
}

pub fn record_credential_operation(operation: &'static str) {
    counter!("gateway_credential_operations_total", "operation" => operation).increment(1);
}

pub fn record_webhook(platform: &str, outcome: &'static str) {
    counter!(
        "gateway_webhooks_total",
        "platform" => platform.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_orders_synced(platform: &str, count: usize) {
    counter!("gateway_orders_synced_total", "platform" => platform.to_string())
        .increment(count as u64);
}
