use super::access::AccessServicePtr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs [`reconcile`](super::AccessService::reconcile) every `period`,
/// starting immediately.
///
/// Expired credentials lose their rules even when nobody opens the status
/// view. Errors are logged and the loop keeps going.
pub fn spawn_reconciler(access: AccessServicePtr, period: Duration) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("periodic reconcile every {:?}", period);

        loop {
            ticker.tick().await;
            match access.reconcile().await {
                Ok(report) => {
                    tracing::debug!(
                        "reconcile: {} pruned, {} auto-bound, {} rules swept",
                        report.pruned.len(),
                        report.auto_bound.len(),
                        report.rules_removed
                    );
                    for warning in &report.warnings {
                        tracing::warn!("reconcile: {}", warning);
                    }
                }
                Err(err) => tracing::warn!("reconcile pass failed: {}", err),
            }
        }
    })
}
