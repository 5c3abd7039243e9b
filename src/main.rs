use anyhow::Result;
use tracing::info;
use zivpn_access::{create_app, spawn_reconciler, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber to log to stdout
    tracing_subscriber::fmt::init();
    tracing::info!("Starting ZIVPN access service...");

    let config = AppConfig::from_env()?;
    let (app, access) = create_app(&config)?;

    let reconciler = config
        .access
        .reconcile_interval
        .map(|period| spawn_reconciler(access, period));
    if reconciler.is_none() {
        info!("Periodic reconcile disabled");
    }

    info!("Starting at endpoint:{}", config.server.bind_addr);
    info!("Starting ZIVPN access API server v{}...", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = reconciler {
        handle.abort();
    }
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    // ---
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
