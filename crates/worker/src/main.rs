use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enginel_core::validation::ValidationEngine;
use enginel_db::{PgRecordStore, PgValidationStore};
use enginel_worker::config::WorkerConfig;
use enginel_worker::reconcile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enginel_worker=debug,enginel_core=info,enginel_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        max_connections = config.max_connections,
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = enginel_db::create_pool(&config.database_url, config.max_connections).await?;
    tracing::info!("Database connection pool created");

    enginel_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    enginel_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    // --- Engine ---
    let engine = Arc::new(ValidationEngine::new(
        Arc::new(PgValidationStore::new(pool.clone())),
        Arc::new(PgRecordStore::new(pool.clone())),
        config.engine.clone(),
    ));

    // --- Background jobs ---
    let cancel = CancellationToken::new();
    let reconcile_handle = tokio::spawn(reconcile::run(
        Arc::clone(&engine),
        config.reconcile_interval,
        cancel.clone(),
    ));

    shutdown_signal().await;

    cancel.cancel();
    if let Err(e) = reconcile_handle.await {
        tracing::error!(error = %e, "Reconciliation task panicked");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
