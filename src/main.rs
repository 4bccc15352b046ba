//! iStore - storefront and back-office API

use std::sync::Arc;

use anyhow::{Context, Result};
use istore::store::PgStore;
use istore::{router, AppConfig, AppState};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "istore=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Connections open on first use
    let store = Arc::new(PgStore::connect_lazy(&config.database_url, config.db_max_connections)?);
    if config.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                tracing::info!(url = %url, "Publishing domain events to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };

    let addr = config.socket_addr();
    let state = AppState::new(config, store.clone(), nats);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "iStore listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    store.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
