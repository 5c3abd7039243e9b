//! Prometheus metrics implementation.
//!
//! Delegates to the helpers in `counters.rs` and `recorder.rs`, which talk
//! to the global `metrics` crate registry. Metrics register themselves on
//! first use; one global handle renders them all.

use crate::domain::Metrics;
use std::time::Instant;

/// Prometheus-based metrics implementation.
///
/// Holds no state: every counter lives in the global registry and the
/// PrometheusHandle in `recorder.rs` renders them.
pub struct PrometheusMetrics {
    // Empty - uses global metrics registry pattern
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        tracing::info!("Creating Prometheus metrics");
        PrometheusMetrics {}
    }
}

impl Metrics for PrometheusMetrics {
    fn render(&self) -> String {
        super::render_metrics()
    }

    fn record_credential_saved(&self) {
        super::increment_credential_saved();
    }

    fn record_credential_deleted(&self) {
        super::increment_credential_deleted();
    }

    fn record_credentials_pruned(&self, count: usize) {
        tracing::debug!("Recording {} pruned credentials", count);
        super::increment_credentials_pruned(count);
    }

    fn record_device_lock(&self, locked: bool) {
        super::increment_device_lock(locked);
    }

    fn record_rules_swept(&self, count: usize) {
        super::increment_rules_swept(count);
    }

    fn record_tool_failure(&self, tool: &str) {
        tracing::debug!("Recording failure of {}", tool);
        super::increment_tool_failure(tool);
    }

    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16) {
        super::track_http_request(start, path, method, status);
    }
}
