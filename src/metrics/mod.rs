//! Metrics module
//!
//! Prometheus counters and histograms for proxied traffic.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "oss_proxy_requests_total",
        "Total number of proxied requests by final status",
        &["method", "status"]
    ).unwrap();

    pub static ref REQUEST_BYTES_TOTAL: Counter = register_counter!(
        "oss_proxy_request_bytes_total",
        "Request body bytes sent upstream"
    ).unwrap();

    pub static ref RESPONSE_BYTES_TOTAL: Counter = register_counter!(
        "oss_proxy_response_bytes_total",
        "Response body bytes relayed to callers"
    ).unwrap();

    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec!(
        "oss_proxy_upstream_duration_seconds",
        "Upstream round trip duration in seconds",
        &["method"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref SIGNATURES_TOTAL: CounterVec = register_counter_vec!(
        "oss_proxy_signatures_total",
        "Requests signed, by signer",
        &["signer"]
    ).unwrap();

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "oss_proxy_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a finished request and its final status
pub fn record_request(method: &str, status: u16) {
    let status = status.to_string();
    REQUESTS_TOTAL
        .with_label_values(&[method, status.as_str()])
        .inc();
}

/// Record body sizes for a relayed exchange
pub fn record_transfer(request_bytes: usize, response_bytes: usize) {
    REQUEST_BYTES_TOTAL.inc_by(request_bytes as f64);
    RESPONSE_BYTES_TOTAL.inc_by(response_bytes as f64);
}

/// Record upstream round trip duration
pub fn record_upstream_duration(method: &str, duration_secs: f64) {
    UPSTREAM_DURATION
        .with_label_values(&[method])
        .observe(duration_secs);
}

/// Record a signed request
pub fn record_signature(signer: &str) {
    SIGNATURES_TOTAL.with_label_values(&[signer]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
