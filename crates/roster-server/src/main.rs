//! Roster Server - Main entry point

use anyhow::Result;
use roster_common::logging::{init_logging, LogConfig, LogFormat, LogOutput, LogRotation};
use roster_ingest::{MemorySink, PgSink};
use std::{sync::Arc, time::Duration};
use tokio::signal;
use tracing::{info, warn};

use roster_server::{
    api::{self, AppState},
    config::{Config, StorageBackend},
    db,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // `/logs` reads back the JSON file written here
    let log_config = LogConfig::builder()
        .output(LogOutput::Both)
        .format(LogFormat::Json)
        .rotation(LogRotation::Never)
        .log_file_prefix("roster-server.log")
        .filter_directives("roster_server=debug,roster_ingest=info,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Roster Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let log_file = config
        .logs
        .file
        .clone()
        .unwrap_or_else(|| log_config.current_log_file());

    let state = match config.server.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;

            AppState::new(
                Arc::new(PgSink::new(pool)),
                config.pipeline.clone(),
                &config.server.upload_dir,
                log_file,
            )?
        },
        StorageBackend::Memory => {
            warn!("Using in-memory storage, records are lost on restart");
            AppState::new(
                Arc::new(MemorySink::new()),
                config.pipeline.clone(),
                &config.server.upload_dir,
                log_file,
            )?
        },
    };

    let state = state.with_retained_runs(config.server.retained_runs);

    tokio::fs::create_dir_all(&config.server.upload_dir).await?;

    let runs = state.runs.clone();
    let app = api::create_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No ingestion run may outlive the server
    let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    if runs.shutdown(timeout).await {
        info!("Server shut down gracefully");
    } else {
        warn!("Server shut down with ingestion runs still in flight");
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
