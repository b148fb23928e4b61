//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mp4forge server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Session state (collected dynamically)
//! - Core engine and conversion metrics

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use mp4forge_core::SessionState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mp4forge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mp4forge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mp4forge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mp4forge_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mp4forge_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mp4forge_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mp4forge_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Session Metrics (collected dynamically)
// =============================================================================

/// Current session state as a numeric code, see [`state_code`].
pub static SESSION_STATE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mp4forge_session_state",
        "Session state (0 engine_loading, 1 idle, 2 input_ready, 3 converting, 4 output_ready, 5 failed)",
    )
    .unwrap()
});

/// True progress of the current run.
pub static SESSION_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mp4forge_session_progress_percent",
        "Progress of the current conversion run",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Session
    registry.register(Box::new(SESSION_STATE.clone())).unwrap();
    registry
        .register(Box::new(SESSION_PROGRESS.clone()))
        .unwrap();

    // Core metrics (engine, inputs, conversions)
    for metric in mp4forge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Numeric code exported for a session state.
pub fn state_code(state: SessionState) -> i64 {
    match state {
        SessionState::EngineLoading => 0,
        SessionState::Idle => 1,
        SessionState::InputReady => 2,
        SessionState::Converting => 3,
        SessionState::OutputReady => 4,
        SessionState::Failed => 5,
    }
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the session gauges are current.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let snapshot = state.session().snapshot().await;
    SESSION_STATE.set(state_code(snapshot.state));
    SESSION_PROGRESS.set(snapshot.progress as i64);
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

/// Normalize a path for metric labels (replace blob ids with a placeholder).
pub fn normalize_path(path: &str) -> String {
    UUID_RE.replace_all(path, "{id}").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_blob_id() {
        let path = "/api/v1/blobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/blobs/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/session"), "/api/v1/session");
    }

    #[test]
    fn test_state_codes_are_distinct() {
        let codes: Vec<i64> = [
            SessionState::EngineLoading,
            SessionState::Idle,
            SessionState::InputReady,
            SessionState::Converting,
            SessionState::OutputReady,
            SessionState::Failed,
        ]
        .into_iter()
        .map(state_code)
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("mp4forge_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Prometheus only outputs metrics that have been accessed
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        SESSION_STATE.set(1);
        SESSION_PROGRESS.set(0);
        mp4forge_core::metrics::CONVERSIONS_TOTAL
            .with_label_values(&["success"])
            .inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("mp4forge_http_request_duration_seconds"));
        assert!(output.contains("mp4forge_http_requests_in_flight"));
        assert!(output.contains("mp4forge_ws_connections_active"));
        assert!(output.contains("mp4forge_ws_connections_total"));
        assert!(output.contains("mp4forge_session_state"));
        assert!(output.contains("mp4forge_session_progress_percent"));
        assert!(output.contains("mp4forge_conversions_total"));
    }
}
