// src/core/metrics.rs

//! Defines and registers Prometheus metrics for bridge monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Gauges ---
    /// The number of client connections currently registered.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("tcp_bridge_connected_clients", "Number of currently connected clients.").unwrap();

    // --- Connection Counters ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("tcp_bridge_connections_received_total", "Total number of connections received.").unwrap();
    /// Connections dropped right after accept because `max_connections` was reached.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("tcp_bridge_connections_rejected_total", "Total number of connections rejected by the connection limit.").unwrap();

    // --- Data Counters ---
    /// Events pushed onto the output queue.
    pub static ref EVENTS_EMITTED_TOTAL: Counter =
        register_counter!("tcp_bridge_events_emitted_total", "Total number of inbound chunks emitted as events.").unwrap();
    pub static ref BYTES_RECEIVED_TOTAL: Counter =
        register_counter!("tcp_bridge_bytes_received_total", "Total bytes read from client connections.").unwrap();
    pub static ref BYTES_DISPATCHED_TOTAL: Counter =
        register_counter!("tcp_bridge_bytes_dispatched_total", "Total bytes written to client connections.").unwrap();

    // --- Dispatch Counters ---
    /// Dispatches addressed to an identifier that is not registered or no longer open.
    pub static ref DISPATCH_DROPPED_TOTAL: Counter =
        register_counter!("tcp_bridge_dispatch_dropped_total", "Total dispatches addressed to unknown or closing connections.").unwrap();
    pub static ref DISPATCH_WRITE_ERRORS_TOTAL: Counter =
        register_counter!("tcp_bridge_dispatch_write_errors_total", "Total dispatches that failed while writing to the socket.").unwrap();
    /// Inbound groups discarded because they did not carry exactly an identifier and a payload.
    pub static ref MALFORMED_GROUPS_TOTAL: Counter =
        register_counter!("tcp_bridge_malformed_groups_total", "Total malformed inbound groups dropped.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
