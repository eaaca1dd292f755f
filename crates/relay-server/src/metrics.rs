//! Metrics collection and export for Relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::RelayStats;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const REQUESTS_TOTAL: &str = "relay_requests_total";
    pub const REQUEST_SECONDS: &str = "relay_request_seconds";
    pub const WAITS_TOTAL: &str = "relay_waits_total";
    pub const CLIENTS_REGISTERED: &str = "relay_clients_registered";
    pub const CLIENTS_WAITING: &str = "relay_clients_waiting";
    pub const HISTORY_LENGTH: &str = "relay_history_length";
    pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
    pub const DELIVERIES_DROPPED: &str = "relay_deliveries_dropped_total";
    pub const ERRORS_TOTAL: &str = "relay_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_counter!(names::REQUESTS_TOTAL, "Requests handled, by operation");
    metrics::describe_histogram!(
        names::REQUEST_SECONDS,
        "Request handling time in seconds, by operation"
    );
    metrics::describe_counter!(names::WAITS_TOTAL, "Completed long-polls, by outcome");
    metrics::describe_gauge!(names::CLIENTS_REGISTERED, "Registered clients");
    metrics::describe_gauge!(names::CLIENTS_WAITING, "Clients with a long-poll in flight");
    metrics::describe_gauge!(names::HISTORY_LENGTH, "Messages in the history log");
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Messages placed in client inboxes");
    metrics::describe_counter!(
        names::DELIVERIES_DROPPED,
        "Messages dropped because a client inbox was full"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a handled request and how long it took.
pub fn record_request(op: &'static str, seconds: f64) {
    counter!(names::REQUESTS_TOTAL, "op" => op).increment(1);
    histogram!(names::REQUEST_SECONDS, "op" => op).record(seconds);
}

/// Record how a long-poll ended.
pub fn record_wait(outcome: &'static str) {
    counter!(names::WAITS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Publish a snapshot of service statistics.
pub fn record_stats(stats: &RelayStats) {
    gauge!(names::CLIENTS_REGISTERED).set(stats.clients as f64);
    gauge!(names::CLIENTS_WAITING).set(stats.waiting as f64);
    gauge!(names::HISTORY_LENGTH).set(stats.history_len as f64);
    counter!(names::DELIVERIES_TOTAL).absolute(stats.delivered);
    counter!(names::DELIVERIES_DROPPED).absolute(stats.dropped);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
