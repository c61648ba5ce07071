//! # Prometheus Metrics
//!
//! Ledger operation counters and latencies, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! under the `quintet` namespace.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Engine calls by operation and outcome (`ok` or an error code).
    pub operations_total: IntCounterVec,
    /// Engine call latency by operation.
    pub operation_latency_seconds: HistogramVec,
    /// Accounts created through the API.
    pub accounts_opened_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("quintet".into()), None)
            .expect("failed to create prometheus registry");

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger operations by kind and outcome"),
            &["op", "outcome"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_total.clone()))
            .expect("metric registration");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger operation latency in seconds, store commit included",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["op"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        let accounts_opened_total =
            IntCounter::new("accounts_opened_total", "Accounts created through the API")
                .expect("metric creation");
        registry
            .register(Box::new(accounts_opened_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            operations_total,
            operation_latency_seconds,
            accounts_opened_total,
        }
    }

    /// Records one finished engine call.
    pub fn observe(&self, op: &str, outcome: &str, started: Instant) {
        self.operations_total.with_label_values(&[op, outcome]).inc();
        self.operation_latency_seconds
            .with_label_values(&[op])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
