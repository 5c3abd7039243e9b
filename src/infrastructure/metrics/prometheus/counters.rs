use metrics::{counter, histogram};
use std::time::Instant;

pub fn increment_credential_saved() {
    counter!("zivpn_credentials_saved_total").increment(1);
}

pub fn increment_credential_deleted() {
    counter!("zivpn_credentials_deleted_total").increment(1);
}

/// Credentials removed because their expiry date passed.
pub fn increment_credentials_pruned(count: usize) {
    counter!("zivpn_credentials_pruned_total").increment(count as u64);
}

pub fn increment_device_lock(locked: bool) {
    let op = if locked { "applied" } else { "released" };
    counter!("zivpn_device_lock_total", "op" => op).increment(1);
}

pub fn increment_rules_swept(count: usize) {
    counter!("zivpn_firewall_rules_swept_total").increment(count as u64);
}

pub fn increment_tool_failure(tool: &str) {
    counter!("zivpn_tool_failures_total", "tool" => tool.to_string()).increment(1);
}

/// Track HTTP request latency using a histogram.
pub fn track_http_request(start: Instant, path: &str, method: &str, status: u16) {
    let elapsed = start.elapsed();
    histogram!(
        "http_request_duration_seconds",
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(elapsed);
}
