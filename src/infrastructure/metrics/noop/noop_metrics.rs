use crate::domain::Metrics;
use std::time::Instant;

/// No-op metrics implementation for testing.
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn new() -> Self {
        NoopMetrics
    }
}

impl Metrics for NoopMetrics {
    // ---
    fn render(&self) -> String {
        String::new()
    }
    fn record_credential_saved(&self) {}
    fn record_credential_deleted(&self) {}
    fn record_credentials_pruned(&self, _: usize) {}
    fn record_device_lock(&self, _: bool) {}
    fn record_rules_swept(&self, _: usize) {}
    fn record_tool_failure(&self, _: &str) {}
    fn record_http_request(&self, _: Instant, _: &str, _: &str, _: u16) {}
}
