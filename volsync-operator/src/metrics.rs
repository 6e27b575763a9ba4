#![allow(clippy::expect_used)] // safe to unwrap static metrics

use std::iter::repeat;
use std::ops::Mul;

use clippy_utilities::NumericCast;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};
use tracing::error;

/// `obj_name,obj_namespace,role,method` label set shared by every per-CR
/// metric, matching a `ReplicationSource`/`ReplicationDestination`'s own
/// identity plus which mover it selected.
pub struct CycleLabels<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub role: &'a str,
    pub method: &'a str,
}

impl CycleLabels<'_> {
    fn values(&self) -> [&str; 4] {
        [self.name, self.namespace, self.role, self.method]
    }
}

const CYCLE_LABEL_NAMES: &[&str] = &["obj_name", "obj_namespace", "role", "method"];

/// Returns a vector of time buckets for the reconcile duration histogram.
fn exponential_time_bucket(start: f64, factor: f64, count: usize) -> Vec<f64> {
    repeat(factor)
        .enumerate()
        .take(count)
        .map(|(i, f)| start.mul(f.powi(i.numeric_cast())))
        .collect::<Vec<_>>()
}

lazy_static! {
    pub(crate) static ref REGISTRY: Registry = Registry::new();
    pub(crate) static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "volsync_operator_reconcile_duration_seconds",
            "Duration of a reconcile loop in seconds",
        )
        .buckets(exponential_time_bucket(0.1, 2.0, 10))
    )
    .expect("failed to create volsync_operator_reconcile_duration_seconds histogram");
    pub(crate) static ref RECONCILE_FAILED_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "volsync_operator_reconcile_failed_count",
            "Number of failed reconciles, by controller and reason"
        ),
        &["controller", "reason"]
    )
    .expect("failed to create volsync_operator_reconcile_failed_count counter");
    static ref MISSED_INTERVALS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "volsync_missed_intervals_total",
            "Number of times a scheduled synchronization deadline was missed"
        ),
        CYCLE_LABEL_NAMES
    )
    .expect("failed to create volsync_missed_intervals_total counter");
    static ref VOLUME_OUT_OF_SYNC: GaugeVec = GaugeVec::new(
        Opts::new(
            "volsync_volume_out_of_sync",
            "1 if the volume is not known to be in sync, 0 otherwise"
        ),
        CYCLE_LABEL_NAMES
    )
    .expect("failed to create volsync_volume_out_of_sync gauge");
    // The rust prometheus crate has no client-side Summary type with sliding
    // quantiles; a histogram lets the same quantiles be computed server-side
    // with histogram_quantile() instead.
    static ref SYNC_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "volsync_sync_duration_seconds",
            "Duration of a completed synchronization cycle in seconds"
        )
        .buckets(exponential_time_bucket(1.0, 2.0, 12)),
        CYCLE_LABEL_NAMES
    )
    .expect("failed to create volsync_sync_duration_seconds histogram");
}

/// Increment [`MISSED_INTERVALS_TOTAL`] for one CR.
pub fn inc_missed_interval(labels: &CycleLabels<'_>) {
    MISSED_INTERVALS_TOTAL.with_label_values(&labels.values()).inc();
}

/// Set [`VOLUME_OUT_OF_SYNC`] for one CR.
pub fn set_volume_out_of_sync(labels: &CycleLabels<'_>, out_of_sync: bool) {
    VOLUME_OUT_OF_SYNC
        .with_label_values(&labels.values())
        .set(if out_of_sync { 1.0 } else { 0.0 });
}

/// Observe a completed cycle's duration for one CR.
pub fn observe_sync_duration(labels: &CycleLabels<'_>, seconds: f64) {
    SYNC_DURATION_SECONDS
        .with_label_values(&labels.values())
        .observe(seconds);
}

/// Register every metric with the global registry. Call once at startup.
pub fn init() {
    REGISTRY
        .register(Box::new(RECONCILE_DURATION.clone()))
        .expect("failed to register volsync_operator_reconcile_duration_seconds histogram");
    REGISTRY
        .register(Box::new(RECONCILE_FAILED_COUNT.clone()))
        .expect("failed to register volsync_operator_reconcile_failed_count counter");
    REGISTRY
        .register(Box::new(MISSED_INTERVALS_TOTAL.clone()))
        .expect("failed to register volsync_missed_intervals_total counter");
    REGISTRY
        .register(Box::new(VOLUME_OUT_OF_SYNC.clone()))
        .expect("failed to register volsync_volume_out_of_sync gauge");
    REGISTRY
        .register(Box::new(SYNC_DURATION_SECONDS.clone()))
        .expect("failed to register volsync_sync_duration_seconds histogram");
}

/// `/metrics` handler: this crate's own registry plus the process defaults
/// `prometheus::gather()` collects.
#[allow(clippy::unused_async)] // required by axum's handler signature
pub async fn metrics() -> String {
    let mut buf1 = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(err) = encoder.encode(&metric_families, &mut buf1) {
        error!("failed to encode custom metrics: {err}");
        return String::new();
    }
    let mut res = String::from_utf8(buf1).unwrap_or_default();
    let mut buf2 = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf2) {
        error!("failed to encode default metrics: {err}");
        return String::new();
    }
    res.push_str(&String::from_utf8_lossy(&buf2));
    res
}
