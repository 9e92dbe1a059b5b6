//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_connections_accepted_total` (counter): RTMP clients accepted
//! - `lb_connections_live` (gauge): RTMP clients currently proxied
//! - `lb_backend_dial_failures_total` (counter): failed dial attempts
//! - `lb_proxied_bytes_total` (counter): bytes by direction
//! - `lb_backend_switches_total` (counter): control API switches, by port
//! - `lb_http_requests_total` (counter): HTTP requests by route and status
//! - `lb_hls_plus_sessions` (gauge): live HLS+ virtual connections
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    metrics::counter!("lb_connections_accepted_total").increment(1);
}

pub fn set_live_connections(live: u64) {
    metrics::gauge!("lb_connections_live").set(live as f64);
}

pub fn record_dial_failure() {
    metrics::counter!("lb_backend_dial_failures_total").increment(1);
}

pub fn record_proxied_bytes(to_backend: u64, to_client: u64) {
    metrics::counter!("lb_proxied_bytes_total", "direction" => "to_backend").increment(to_backend);
    metrics::counter!("lb_proxied_bytes_total", "direction" => "to_client").increment(to_client);
}

pub fn record_backend_switch(port: u16) {
    metrics::counter!("lb_backend_switches_total", "port" => port.to_string()).increment(1);
}

pub fn record_http_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "lb_http_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("lb_http_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn set_hls_plus_sessions(count: usize) {
    metrics::gauge!("lb_hls_plus_sessions").set(count as f64);
}
