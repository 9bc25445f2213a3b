//! Prometheus metrics for the lookup pipeline.
//!
//! - `dnsbl_batches_total{result}` - enqueue attempts (`queued`, `dropped`)
//! - `dnsbl_probes_total{outcome}` - lookups (`listed`, `no_match`, `error`, `timeout`, `cancelled`)
//! - `dnsbl_upserts_total{result}` - store writes (`inserted`, `updated`, `failed`)
//! - `dnsbl_probe_duration_seconds` - lookup latency histogram
//! - `dnsbl_queue_depth` - batches waiting for the worker

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

pub static BATCHES: OnceLock<IntCounterVec> = OnceLock::new();

pub static PROBES: OnceLock<IntCounterVec> = OnceLock::new();

pub static UPSERTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static PROBE_DURATION: OnceLock<Histogram> = OnceLock::new();

pub static QUEUE_DEPTH: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Recording helpers are no-ops until this has run.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(BATCHES, IntCounterVec::new(Opts::new("dnsbl_batches_total", "Batch enqueue attempts by result"), &["result"]));
    register!(PROBES, IntCounterVec::new(Opts::new("dnsbl_probes_total", "Blocklist lookups by outcome"), &["outcome"]));
    register!(UPSERTS, IntCounterVec::new(Opts::new("dnsbl_upserts_total", "Record store writes by result"), &["result"]));
    register!(PROBE_DURATION, Histogram::with_opts(
        HistogramOpts::new("dnsbl_probe_duration_seconds", "Blocklist lookup latency")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])));
    register!(QUEUE_DEPTH, IntGauge::new("dnsbl_queue_depth", "Batches waiting for the lookup worker"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

#[inline]
pub fn record_batch(result: &str) {
    if let Some(c) = BATCHES.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn record_probe(outcome: &str) {
    if let Some(c) = PROBES.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

#[inline]
pub fn record_upsert(result: &str) {
    if let Some(c) = UPSERTS.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn observe_probe_duration(secs: f64) {
    if let Some(h) = PROBE_DURATION.get() {
        h.observe(secs);
    }
}

#[inline]
pub fn set_queue_depth(depth: usize) {
    if let Some(g) = QUEUE_DEPTH.get() {
        g.set(depth as i64);
    }
}
