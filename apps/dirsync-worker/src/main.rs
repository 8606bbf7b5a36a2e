//! dirsync worker.
//!
//! Claims due directory-sync bridges from PostgreSQL and reconciles each
//! provider's users into its SCIM directory until stopped.

mod config;
mod logging;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dirsync_db::{run_migrations, DbPool};
use dirsync_engine::{BridgeRunner, DirectorySyncer, PgBridgeStore};

use crate::config::Config;

#[tokio::main]
async fn main() {
    // Fail fast on missing or invalid configuration.
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sync_interval_secs = config.runner.sync_interval.as_secs(),
        poll_interval_secs = config.runner.poll_interval.as_secs(),
        max_consecutive_failures = config.runner.max_consecutive_failures,
        dry_run = config.runner.dry_run,
        "Starting dirsync worker"
    );

    let pool = match DbPool::connect(&config.database_url, config.database_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    if config.run_migrations {
        if let Err(e) = run_migrations(&pool).await {
            error!(error = %e, "Failed to run migrations");
            std::process::exit(1);
        }
    }

    let store = Arc::new(PgBridgeStore::new(pool.inner().clone()));
    let syncer = Arc::new(DirectorySyncer::new(
        store.clone(),
        config.encryption.clone(),
        &config.runner,
    ));
    let runner = match BridgeRunner::new(store, syncer, config.runner.clone()) {
        Ok(runner) => runner,
        Err(e) => {
            error!(error = %e, "Invalid runner configuration");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let runner_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { runner.run(shutdown).await }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping runner");
    shutdown.cancel();

    if let Err(e) = runner_task.await {
        error!(error = %e, "Runner task ended abnormally");
    }

    pool.inner().close().await;
    info!("Worker shutdown complete");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
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
}
