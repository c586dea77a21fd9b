//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (verdicts, engine builds, cache size)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `waf_inspections_total` (counter): inspections by verdict
//! - `waf_inspection_duration_seconds` (histogram): time to verdict
//! - `waf_engine_builds_total` (counter): builds by outcome
//! - `waf_partial_fetch_total` (counter): rule keys skipped during a build
//! - `waf_cached_engines` (gauge): current cache entry count
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Profile ids are not used as labels (unbounded cardinality)

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished inspection.
pub fn record_inspection(verdict: &'static str, start: Instant) {
    ::metrics::counter!("waf_inspections_total", "verdict" => verdict).increment(1);
    ::metrics::histogram!("waf_inspection_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// Record an engine build by outcome (`ok`, `store_error`, `compile_error`).
pub fn record_engine_build(outcome: &'static str) {
    ::metrics::counter!("waf_engine_builds_total", "outcome" => outcome).increment(1);
}

/// Record a rule key skipped because it could not be fetched.
pub fn record_partial_fetch() {
    ::metrics::counter!("waf_partial_fetch_total").increment(1);
}

/// Record the number of cached engines.
pub fn record_cached_engines(count: usize) {
    ::metrics::gauge!("waf_cached_engines").set(count as f64);
}
