//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_bytes_total` (counter): payload bytes relayed, by direction
//! - `tunnel_frames_total` (counter): messages relayed, by direction
//! - `tunnel_parse_failures_total` (counter): disguised headers rejected
//! - `tunnel_connect_failures_total` (counter): failed dials to the remote
//! - `tunnel_sessions_active` (gauge): live sessions

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::relay::Direction;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_relayed(direction: Direction, bytes: usize) {
    ::metrics::counter!("tunnel_bytes_total", "direction" => direction.as_str()).increment(bytes as u64);
    ::metrics::counter!("tunnel_frames_total", "direction" => direction.as_str()).increment(1);
}

pub fn record_parse_failure() {
    ::metrics::counter!("tunnel_parse_failures_total").increment(1);
}

pub fn record_connect_failure() {
    ::metrics::counter!("tunnel_connect_failures_total").increment(1);
}

pub fn session_opened() {
    ::metrics::gauge!("tunnel_sessions_active").increment(1.0);
}

pub fn session_closed() {
    ::metrics::gauge!("tunnel_sessions_active").decrement(1.0);
}
