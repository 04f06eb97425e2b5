//! Prometheus Metrics Module
//!
//! # Metrics Collected
//! - Messages sent and deleted, by kind
//! - Real-time publish failures
//! - Active message subscriptions
//! - DM channels created vs reactivated
//! - Chat reports filed, by target kind
//! - Store transaction latency

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Persisted messages by kind
pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_sent_total", "Total number of persisted chat messages")
            .namespace("business_chat"),
        &["kind"],
    )
    .expect("Failed to create MESSAGES_SENT_TOTAL metric")
});

/// Soft-deleted messages
pub static MESSAGES_DELETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("messages_deleted_total", "Total number of soft-deleted chat messages")
            .namespace("business_chat"),
    )
    .expect("Failed to create MESSAGES_DELETED_TOTAL metric")
});

/// Committed messages that could not be published to the bus
pub static PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("publish_failures_total", "Messages committed but not published")
            .namespace("business_chat"),
    )
    .expect("Failed to create PUBLISH_FAILURES_TOTAL metric")
});

/// Live message subscriptions
pub static SUBSCRIPTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("subscriptions_active", "Number of live message subscriptions")
            .namespace("business_chat"),
    )
    .expect("Failed to create SUBSCRIPTIONS_ACTIVE metric")
});

/// DM channel requests resolved by outcome
pub static DM_CHANNELS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dm_channels_total", "DM channel requests by outcome")
            .namespace("business_chat"),
        &["outcome"], // "created", "reactivated"
    )
    .expect("Failed to create DM_CHANNELS_TOTAL metric")
});

/// Filed chat reports by target kind
pub static REPORTS_FILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reports_filed_total", "Chat reports filed by target kind")
            .namespace("business_chat"),
        &["target"],
    )
    .expect("Failed to create REPORTS_FILED_TOTAL metric")
});

/// Store transaction duration histogram
pub static TRANSACTION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];
    HistogramVec::new(
        HistogramOpts::new(
            "transaction_duration_seconds",
            "Store transaction latency in seconds, begin to commit",
        )
        .namespace("business_chat")
        .buckets(buckets),
        &["store"],
    )
    .expect("Failed to create TRANSACTION_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(MESSAGES_SENT_TOTAL.clone()))
        .expect("Failed to register MESSAGES_SENT_TOTAL");
    registry
        .register(Box::new(MESSAGES_DELETED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_DELETED_TOTAL");
    registry
        .register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))
        .expect("Failed to register PUBLISH_FAILURES_TOTAL");
    registry
        .register(Box::new(SUBSCRIPTIONS_ACTIVE.clone()))
        .expect("Failed to register SUBSCRIPTIONS_ACTIVE");
    registry
        .register(Box::new(DM_CHANNELS_TOTAL.clone()))
        .expect("Failed to register DM_CHANNELS_TOTAL");
    registry
        .register(Box::new(REPORTS_FILED_TOTAL.clone()))
        .expect("Failed to register REPORTS_FILED_TOTAL");
    registry
        .register(Box::new(TRANSACTION_DURATION_SECONDS.clone()))
        .expect("Failed to register TRANSACTION_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_message_sent(kind: &str) {
    MESSAGES_SENT_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_messages_deleted(count: usize) {
    MESSAGES_DELETED_TOTAL.inc_by(count as u64);
}

pub fn record_publish_failure() {
    PUBLISH_FAILURES_TOTAL.inc();
}

pub fn record_dm_channel(outcome: &str) {
    DM_CHANNELS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_report_filed(target: &str) {
    REPORTS_FILED_TOTAL.with_label_values(&[target]).inc();
}

pub fn record_transaction(store: &str, duration_secs: f64) {
    TRANSACTION_DURATION_SECONDS
        .with_label_values(&[store])
        .observe(duration_secs);
}

/// Keeps [`SUBSCRIPTIONS_ACTIVE`] in step with a subscription's lifetime.
pub struct SubscriptionGauge;

impl SubscriptionGauge {
    pub fn acquire() -> Self {
        SUBSCRIPTIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for SubscriptionGauge {
    fn drop(&mut self) {
        SUBSCRIPTIONS_ACTIVE.dec();
    }
}
