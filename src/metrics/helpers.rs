//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{COMPILES_TOTAL, CSS_INLINE_FAILURES_TOTAL, EMAILS_TOTAL, RENDERS_TOTAL, RENDER_DURATION};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording template metrics
pub struct TemplateMetrics;

impl TemplateMetrics {
    pub fn record_compiled() {
        COMPILES_TOTAL.with_label_values(&["success"]).inc();
    }

    pub fn record_compile_failed() {
        COMPILES_TOTAL.with_label_values(&["failure"]).inc();
    }

    pub fn record_rendered(duration: Duration) {
        RENDERS_TOTAL.with_label_values(&["success"]).inc();
        RENDER_DURATION.observe(duration.as_secs_f64());
    }

    pub fn record_render_failed() {
        RENDERS_TOTAL.with_label_values(&["failure"]).inc();
    }
}

/// Helper struct for recording CSS inlining metrics
pub struct CssMetrics;

impl CssMetrics {
    pub fn record_failure() {
        CSS_INLINE_FAILURES_TOTAL.inc();
    }
}

/// Helper struct for recording dispatch metrics
pub struct EmailMetrics;

impl EmailMetrics {
    pub fn record_sent() {
        EMAILS_TOTAL.with_label_values(&["sent"]).inc();
    }

    /// Rendered while sending is disabled
    pub fn record_dry_run() {
        EMAILS_TOTAL.with_label_values(&["dry_run"]).inc();
    }

    pub fn record_render_failed() {
        EMAILS_TOTAL.with_label_values(&["render_failed"]).inc();
    }

    pub fn record_transport_failed() {
        EMAILS_TOTAL.with_label_values(&["transport_failed"]).inc();
    }
}
