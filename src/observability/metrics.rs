//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_messages_dropped_total` (counter): inbound messages dropped, by reason
//! - `bridge_redefinitions_blocked_total` (counter): writes to the guarded slot
//! - `bridge_scripts_removed_total` (counter): competing wallet scripts filtered
//! - `bridge_discovery_attempts_total` (counter): discovery passes, by outcome
//! - `bridge_transactions_total` (counter): transactions, by outcome
//! - `bridge_errors_reported_total` (counter): noise controller reports, by outcome
//! - `bridge_recovery_attempts_total` (counter): auto-recovery actions run
//! - `bridge_pending_requests` (gauge): broker requests awaiting a response
//! - `bridge_connection_status` (gauge): 0=disconnected, 1=connecting, 2=connected
//!
//! Every recorder is a no-op until `init_metrics` installs the exporter.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_message_dropped(reason: &'static str) {
    counter!("bridge_messages_dropped_total", "reason" => reason).increment(1);
}

pub fn record_redefinition_blocked() {
    counter!("bridge_redefinitions_blocked_total").increment(1);
}

pub fn record_script_removed() {
    counter!("bridge_scripts_removed_total").increment(1);
}

pub fn record_discovery_attempt(found: bool) {
    let outcome = if found { "found" } else { "empty" };
    counter!("bridge_discovery_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_transaction(outcome: &'static str) {
    counter!("bridge_transactions_total", "outcome" => outcome).increment(1);
}

pub fn record_error_report(outcome: &'static str) {
    counter!("bridge_errors_reported_total", "outcome" => outcome).increment(1);
}

pub fn record_recovery_attempt(key: &str) {
    counter!("bridge_recovery_attempts_total", "action" => key.to_string()).increment(1);
}

pub fn set_pending_requests(count: usize) {
    gauge!("bridge_pending_requests").set(count as f64);
}

pub fn record_connection_status(status: &str) {
    let value = match status {
        "connected" => 2.0,
        "connecting" => 1.0,
        _ => 0.0,
    };
    gauge!("bridge_connection_status").set(value);
}
