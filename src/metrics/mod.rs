//! Prometheus metrics for the mailer.
//!
//! This module provides metrics for monitoring the template pipeline:
//! - Compile outcomes for templates and layouts
//! - Render outcomes and latency
//! - Email dispatch outcomes (sent, dry run, render or transport failure)
//! - CSS inlining failures

mod helpers;

pub use helpers::{encode_metrics, CssMetrics, EmailMetrics, TemplateMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "mailer";

lazy_static! {
    // ============================================================================
    // Template Metrics
    // ============================================================================

    /// Template and layout compiles by outcome
    pub static ref COMPILES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_compiles_total", METRIC_PREFIX),
        "Total template compiles",
        &["outcome"]
    ).unwrap();

    /// Renders by outcome
    pub static ref RENDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_renders_total", METRIC_PREFIX),
        "Total template renders",
        &["outcome"]
    ).unwrap();

    /// Render latency including layout composition
    pub static ref RENDER_DURATION: Histogram = register_histogram!(
        format!("{}_render_duration_seconds", METRIC_PREFIX),
        "Template render duration in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    ).unwrap();

    /// Stylesheets that could not be inlined
    pub static ref CSS_INLINE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_css_inline_failures_total", METRIC_PREFIX),
        "Total CSS inlining failures"
    ).unwrap();

    // ============================================================================
    // Email Metrics
    // ============================================================================

    /// Dispatch attempts by outcome
    pub static ref EMAILS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_total", METRIC_PREFIX),
        "Total email dispatch attempts",
        &["outcome"]
    ).unwrap();
}
