//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use harbor_protocol::VaultSummary;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Accepted operations, by operation name.
    pub operations_total: IntCounterVec,
    /// Rejected operations, by operation name and error kind.
    pub rejections_total: IntCounterVec,
    pub round: IntGauge,
    pub epoch: IntGauge,
    /// Assets staked this round, not yet in shares.
    pub total_pending: IntGauge,
    pub total_shares: IntGauge,
    pub vault_total_balance: IntGauge,
    /// Start price of the current round as a plain ratio.
    pub price_per_share: Gauge,
    /// Time spent inside the engine per operation.
    pub operation_latency_seconds: Histogram,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("harbor".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Operations committed by the engine"),
            &["op"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Operations rejected by the engine"),
            &["op", "kind"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let round = IntGauge::new("round", "Current vault round")?;
        registry.register(Box::new(round.clone()))?;

        let epoch = IntGauge::new("epoch", "Current withdrawal epoch")?;
        registry.register(Box::new(epoch.clone()))?;

        let total_pending = IntGauge::new("total_pending", "Assets pending conversion this round")?;
        registry.register(Box::new(total_pending.clone()))?;

        let total_shares = IntGauge::new("total_shares", "Outstanding vault shares")?;
        registry.register(Box::new(total_shares.clone()))?;

        let vault_total_balance =
            IntGauge::new("vault_total_balance", "Wrapped units held by the vault")?;
        registry.register(Box::new(vault_total_balance.clone()))?;

        let price_per_share = Gauge::new("price_per_share", "Start price of the current round")?;
        registry.register(Box::new(price_per_share.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Engine time per operation in seconds, including the snapshot write",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            rejections_total,
            round,
            epoch,
            total_pending,
            total_shares,
            vault_total_balance,
            price_per_share,
            operation_latency_seconds,
        })
    }

    /// Refreshes the gauges from a vault summary.
    pub fn observe(&self, summary: &VaultSummary) {
        self.round.set(i64::from(summary.round));
        self.epoch.set(i64::from(summary.epoch));
        self.total_pending.set(clamp(summary.total_pending));
        self.total_shares.set(clamp(summary.total_shares));
        self.vault_total_balance.set(clamp(summary.vault_total_balance));
        let unit = 10f64.powi(i32::from(summary.decimals));
        self.price_per_share.set(summary.price_per_share as f64 / unit);
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

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

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
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
