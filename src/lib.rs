// src/lib.rs
use anyhow::Result;
use app_state::AppState;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use handlers::{
    delete_credential, health_check, list_credentials, metrics_handler, root_handler,
    run_reconcile, save_credential, set_lock, track_requests,
};

// Public exports (visible outside this module)
pub mod domain;

// Internal-only exports (sibling access within this module)
mod app_state;
mod config;
mod handlers;
mod infrastructure;
mod services;

pub use config::*;

// Publicly expose the infrastructure creation functions and adapters
pub use infrastructure::{
    create_host_adapters, // ---
    create_json_store,
    create_noop_metrics,
    create_prom_metrics,
    CommandRunner,
    HostAdapters,
    HostConnTrack,
    HostSockets,
    IptablesFilter,
    JsonFileStore,
    MemoryPacketFilter,
    PasswordSyncMode,
    RecordingVpnServer,
    StaticNetwork,
    ZivpnServer,
};

// The access-control core
pub use services::{
    spawn_reconciler, AccessService, AccessServicePtr, AccessSettings, Collaborators,
    HealthReport,
};

/// Build the HTTP router from environment configuration.
pub fn create_router() -> Result<Router> {
    // ---
    let config = AppConfig::from_env()?;
    let (router, _access) = create_app(&config)?;
    Ok(router)
}

/// Wires every collaborator selected by `config` and returns the router
/// together with the access service, so the caller can also drive the
/// periodic reconcile pass.
pub fn create_app(config: &AppConfig) -> Result<(Router, AccessServicePtr)> {
    // ---
    tracing_subscriber::fmt::try_init().ok(); // Ignores if already initialized

    // Determine metrics implementation from configuration
    let metrics = if config.server.metrics_type == "prom" {
        create_prom_metrics()?
    } else {
        create_noop_metrics()?
    };

    // Create infrastructure dependencies
    let host = create_host_adapters(&config.host, &config.vpn);
    let store = Arc::new(create_json_store(&config.store.users_file));
    tracing::info!("Credential registry at {}", config.store.users_file.display());

    let access = Arc::new(AccessService::new(
        Collaborators {
            store,
            packet_filter: host.packet_filter,
            conntrack: host.conntrack,
            sockets: host.sockets,
            vpn: host.vpn,
            clock: Arc::new(domain::SystemClock),
            metrics: metrics.clone(),
        },
        AccessSettings {
            default_validity_days: config.access.default_validity_days,
            auto_bind: config.access.auto_bind,
        },
    ));

    Ok((create_router_with(access.clone(), metrics), access))
}

/// Build the HTTP router around an already wired access service.
pub fn create_router_with(access: AccessServicePtr, metrics: domain::MetricsPtr) -> Router {
    // ---
    let app_state = AppState::new(metrics, access);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/reconcile", post(run_reconcile))
        .route("/credentials", get(list_credentials).post(save_credential))
        .route("/credentials/{username}", delete(delete_credential))
        .route("/credentials/{username}/lock", post(set_lock))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            track_requests,
        ))
        .with_state(app_state)
}
