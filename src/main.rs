use schema_engine::config::Config;
use schema_engine::metadata::ensure_engine_tables;
use schema_engine::pool;
use schema_engine::sync::{SyncEngine, SyncScheduler};

use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present; reported once logging is up
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&config.log_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Could not create log directory {}: {}", config.log_dir, e);
    });

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "schema-engine.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,schema_engine=debug")),
        )
        // Console output
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        // File output with JSON format for easy parsing
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", config.log_dir);
    if let Err(e) = dotenv {
        warn!("No .env file found or error loading it: {}", e);
    }

    info!("Starting schema engine instance {}", config.instance_id);
    info!("Max connections: {}", config.max_connections);
    info!(
        "Drift check every {:?} (lock TTL {:?}, on startup: {})",
        config.sync_interval, config.sync_lock_ttl, config.sync_on_startup
    );
    info!("Reserved property prefix: {}", config.reserved_property_prefix);

    let pool = pool::connect(&config).await?;
    ensure_engine_tables(&pool).await?;

    let engine = Arc::new(
        SyncEngine::new(pool.clone(), config.instance_id.clone()).with_lock_ttl(config.sync_lock_ttl),
    );
    let scheduler =
        SyncScheduler::new(engine, config.sync_interval, config.sync_on_startup).spawn();

    shutdown_signal().await;

    scheduler.abort();
    pool.close();
    info!("Schema engine shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
