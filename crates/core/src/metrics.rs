//! Prometheus metrics for the conversion session.
//!
//! This module provides metrics for:
//! - Engine loading
//! - Input acceptance
//! - Conversion runs (results and duration)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Engine
// =============================================================================

/// Engine load attempts by result.
pub static ENGINE_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mp4forge_engine_loads_total", "Total engine load attempts"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Session
// =============================================================================

/// Inputs offered to the session by result.
pub static INPUTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mp4forge_inputs_total", "Total input files offered"),
        &["result"], // "accepted", "rejected"
    )
    .unwrap()
});

/// Conversion runs by result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mp4forge_conversions_total", "Total conversion runs"),
        &["result"], // "success", "failed", "abandoned"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mp4forge_conversion_duration_seconds",
            "Duration of a conversion run",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 1800.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ENGINE_LOADS.clone()),
        Box::new(INPUTS_TOTAL.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
    ]
}
