use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use telemon_server::app::build_http_app;
use telemon_server::config::{ServerArgs, ServerConfig};
use telemon_server::state::AppState;
use telemon_storage::{restore, MemStorage, PersistenceService, SqliteStorage, Storage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("telemon=info".parse()?))
        .init();

    let args = ServerArgs::parse();
    let config = ServerConfig::from_args(&args)?;

    tracing::info!(
        address = %config.address,
        store_interval_secs = config.store_interval_secs,
        file = %config.file_storage_path.display(),
        restore = config.restore,
        restore_policy = %config.restore_policy,
        database = ?config.database_path,
        "telemon-server starting"
    );

    let persistence = Arc::new(
        PersistenceService::open(&config.file_storage_path, config.store_interval())
            .context("failed to open metric log")?,
    );

    let (storage, sqlite): (Arc<dyn Storage>, Option<Arc<SqliteStorage>>) =
        match &config.database_path {
            Some(path) => {
                let db = Arc::new(
                    SqliteStorage::open(path)
                        .with_context(|| format!("failed to open database {}", path.display()))?,
                );
                (db.clone() as Arc<dyn Storage>, Some(db))
            }
            None => (Arc::new(MemStorage::new()) as Arc<dyn Storage>, None),
        };

    if config.restore {
        let records = PersistenceService::read_all_data(persistence.path())
            .context("failed to read metric log")?;
        restore(storage.as_ref(), records, config.restore_policy)
            .context("failed to restore metrics")?;
    }

    let state = AppState::new(storage, sqlite, persistence.clone(), config.restore_policy);
    let app = build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    tracing::info!(address = %config.address, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(telemon_common::shutdown_signal())
        .await;

    if let Err(e) = persistence.stop().await {
        tracing::error!(error = %e, "Failed to close metric log");
    }
    served?;

    tracing::info!("telemon-server stopped");
    Ok(())
}
