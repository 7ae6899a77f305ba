//! Metrics collection and exposition.
//!
//! # Metrics
//! - `poller_ticks_total` (counter): ticks by result (ok, registry_error)
//! - `poller_tick_duration_seconds` (histogram): time for all probes of a tick
//! - `poller_probe_results_total` (counter): probe outcomes by verdict and kind
//! - `poller_breaker_transitions_total` (counter): breaker transitions by target state
//! - `poller_fanout_dropped_total` (counter): events dropped on a full consumer queue
//! - `poller_persist_total` (counter): persister writes by result
//!
//! Recording is a no-op until a recorder is installed by [`init_metrics`].

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tick(result: &'static str, start: Instant) {
    counter!("poller_ticks_total", "result" => result).increment(1);
    histogram!("poller_tick_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_probe_result(verdict: &'static str, kind: &'static str) {
    counter!("poller_probe_results_total", "verdict" => verdict, "kind" => kind).increment(1);
}

pub fn record_breaker_transition(to: &'static str) {
    counter!("poller_breaker_transitions_total", "to" => to).increment(1);
}

pub fn record_fanout_dropped(consumer: &str) {
    counter!("poller_fanout_dropped_total", "consumer" => consumer.to_string()).increment(1);
}

pub fn record_persist(result: &'static str) {
    counter!("poller_persist_total", "result" => result).increment(1);
}
