//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wikimirror_requests_total` (counter): requests by status and outcome
//! - `wikimirror_redirects_total` (counter): bare-root canonicalizations
//! - `wikimirror_rewrites_total` (counter): attribute values rewritten
//!
//! Recording without an installed exporter is a no-op, so the rewriter and
//! handler call these unconditionally.

use std::net::SocketAddr;

use axum::http::StatusCode;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics endpoint started"),
        Err(err) => tracing::error!(error = %err, "failed to start metrics endpoint"),
    }
}

pub fn record_request(status: StatusCode, outcome: &'static str) {
    metrics::counter!(
        "wikimirror_requests_total",
        "status" => status.as_u16().to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_redirect() {
    metrics::counter!("wikimirror_redirects_total").increment(1);
}

pub fn record_rewrite() {
    metrics::counter!("wikimirror_rewrites_total").increment(1);
}
