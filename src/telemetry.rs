//! Telemetry module for Storelink
//!
//! Prometheus counters for the token lifecycle and webhook deliveries.

use crate::{Result, StorelinkError};
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, TextEncoder, register_counter_vec};

/// Token refresh outcomes (refreshed, coalesced, superseded, failed)
static TOKEN_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "storelink_token_refresh_total",
        "Total number of token refresh attempts by outcome",
        &["outcome"]
    )
    .expect("token refresh metric definition is valid")
});

/// Authorization callback outcomes
static OAUTH_CALLBACK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "storelink_oauth_callback_total",
        "Total number of OAuth callbacks by outcome",
        &["outcome"]
    )
    .expect("oauth callback metric definition is valid")
});

/// Webhook deliveries by scope and verification result
static WEBHOOK_DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "storelink_webhook_deliveries_total",
        "Total number of webhook deliveries by scope and result",
        &["scope", "result"]
    )
    .expect("webhook metric definition is valid")
});

/// Record a token refresh outcome
pub fn record_refresh(outcome: &str) {
    TOKEN_REFRESH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an authorization callback outcome
pub fn record_callback(outcome: &str) {
    OAUTH_CALLBACK_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a webhook delivery
pub fn record_webhook(scope: &str, result: &str) {
    WEBHOOK_DELIVERIES_TOTAL
        .with_label_values(&[scope, result])
        .inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| StorelinkError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| StorelinkError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}
