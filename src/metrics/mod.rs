//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission and confirmation
//! - Contract read calls
//! - Allocation runs

use crate::error::{OperatorError, OperatorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "operator_transactions_submitted_total",
        "Total transactions accepted by the node",
        &["method"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "operator_transactions_failed_total",
        "Total transactions that failed before broadcast completed",
        &["method", "stage"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "operator_transactions_confirmed_total",
        "Total transactions observed mined",
        &["method"]
    ).unwrap();

    pub static ref TX_TIMEOUTS: CounterVec = register_counter_vec!(
        "operator_confirmation_timeouts_total",
        "Total confirmation waits that timed out",
        &["method"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "operator_confirmation_latency_seconds",
        "Time from broadcast to observed inclusion",
        &["method"],
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref NEXT_NONCE: Gauge = register_gauge!(
        "operator_next_nonce",
        "Next nonce the transaction manager will use"
    ).unwrap();

    // Read metrics
    pub static ref READ_CALLS: CounterVec = register_counter_vec!(
        "operator_read_calls_total",
        "Total successful contract read calls",
        &["method"]
    ).unwrap();

    pub static ref READ_FAILURES: CounterVec = register_counter_vec!(
        "operator_read_failures_total",
        "Total failed contract read calls",
        &["method"]
    ).unwrap();

    // Allocation metrics
    pub static ref ALLOCATION_RUNS: CounterVec = register_counter_vec!(
        "operator_allocation_runs_total",
        "Allocation runs by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    host: String,
    port: u16,
}

impl MetricsServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub async fn run(&self) -> OperatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| OperatorError::Config(format!("Invalid metrics address: {}", e)))?;
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| OperatorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| OperatorError::Internal(e.to_string()))
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> OperatorResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| OperatorError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| OperatorError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted(method: &str) {
    TX_SUBMITTED.with_label_values(&[method]).inc();
}

pub fn record_tx_failed(method: &str, stage: &str) {
    TX_FAILED.with_label_values(&[method, stage]).inc();
}

pub fn record_tx_confirmed(method: &str, latency: Duration) {
    TX_CONFIRMED.with_label_values(&[method]).inc();
    TX_LATENCY
        .with_label_values(&[method])
        .observe(latency.as_secs_f64());
}

pub fn record_confirmation_timeout(method: &str) {
    TX_TIMEOUTS.with_label_values(&[method]).inc();
}

pub fn record_next_nonce(nonce: u64) {
    NEXT_NONCE.set(nonce as f64);
}

pub fn record_read_call(method: &str) {
    READ_CALLS.with_label_values(&[method]).inc();
}

pub fn record_read_failure(method: &str) {
    READ_FAILURES.with_label_values(&[method]).inc();
}

pub fn record_allocation_run(kind: &str, succeeded: bool) {
    ALLOCATION_RUNS
        .with_label_values(&[kind, if succeeded { "ok" } else { "failed" }])
        .inc();
}
