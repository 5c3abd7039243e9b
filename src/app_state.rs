//! Application state management.
//!
//! This module defines the shared state passed to all Axum handlers via the
//! `State` extractor. It holds the access service and the metrics
//! implementation, both behind `Arc` so cloning per request is cheap.

use crate::domain::MetricsPtr;
use crate::services::AccessServicePtr;

/// Shared application state passed to all Axum handlers.
///
/// This struct serves as the Dependency Injection container for the
/// application. Handlers depend on the `AccessService` API and the
/// `Metrics` trait, never on the concrete host adapters behind them.
///
/// # Lifecycle
///
/// 1. Created once in `create_router()` during application startup
/// 2. Attached to the Axum router via `.with_state(app_state)`
/// 3. Cloned automatically by Axum for each incoming HTTP request
/// 4. Handlers extract via `State(state): State<AppState>`
#[derive(Clone)]
pub(crate) struct AppState {
    /// Metrics implementation for recording application events.
    ///
    /// Either Prometheus-backed (production) or no-op (testing/development).
    metrics: MetricsPtr,

    /// The access-control core. All registry, firewall and VPN work goes
    /// through it and is serialized inside it.
    access: AccessServicePtr,
}

impl AppState {
    // ---
    pub fn new(metrics: MetricsPtr, access: AccessServicePtr) -> Self {
        // ---
        AppState { metrics, access }
    }

    /// Get a reference to the metrics implementation.
    pub(crate) fn metrics(&self) -> &MetricsPtr {
        // ---
        &self.metrics
    }

    /// Get a reference to the access service.
    pub(crate) fn access(&self) -> &AccessServicePtr {
        // ---
        &self.access
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::FixedClock;
    use crate::infrastructure::{
        create_json_store, create_noop_metrics, MemoryPacketFilter, RecordingVpnServer,
        StaticNetwork,
    };
    use crate::services::{AccessService, AccessSettings, Collaborators};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn test_app_state_creation_and_clone() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let metrics = create_noop_metrics().unwrap();
        let network = Arc::new(StaticNetwork::new());
        let access = Arc::new(AccessService::new(
            Collaborators {
                store: Arc::new(create_json_store(dir.path().join("users.json"))),
                packet_filter: Arc::new(MemoryPacketFilter::new()),
                conntrack: network.clone(),
                sockets: network,
                vpn: Arc::new(RecordingVpnServer::default()),
                clock: Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())),
                metrics: metrics.clone(),
            },
            AccessSettings::default(),
        ));

        let app_state = AppState::new(metrics, access);
        let cloned = app_state.clone();

        // Clones share the same service
        assert!(Arc::ptr_eq(app_state.access(), cloned.access()));
        assert_eq!(app_state.metrics().render(), "");
    }
}
