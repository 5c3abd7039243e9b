use std::sync::Arc;
use std::time::Instant;

/// Abstraction for application metrics (counters, histograms).
pub trait Metrics: Send + Sync + 'static {
    // ---
    /// Render current metrics in Prometheus text format.
    fn render(&self) -> String;

    /// Record a credential created or updated.
    fn record_credential_saved(&self);

    /// Record a credential deleted by an administrator.
    fn record_credential_deleted(&self);

    /// Record credentials removed by the expiry reconciler.
    fn record_credentials_pruned(&self, count: usize);

    /// Record a device lock installed (`locked = true`) or released.
    fn record_device_lock(&self, locked: bool);

    /// Record stray firewall rules deleted by a reconcile sweep.
    fn record_rules_swept(&self, count: usize);

    /// Record an external tool call that failed or timed out.
    fn record_tool_failure(&self, tool: &str);

    /// Record HTTP request duration and labels.
    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16);
}

/// Type alias for any backend that implements Metrics.
pub type MetricsPtr = Arc<dyn Metrics>;
