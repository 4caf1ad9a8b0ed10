mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use detour_core::MappingStore;
use detour_gateway::{App, AppState};
use detour_generator::SeqGenerator;
use detour_storage::{InMemoryMappingStore, MySqlMappingStore};
use detour_sync::InMemoryHierarchy;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::{StorageBackendArg, CLI};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    detour_telemetry::init(config.log_filter.as_deref(), config.log_format)?;

    info!(
        listen_addr = %config.listen_addr,
        storage_backend = %config.storage,
        sync_enabled = config.sync_enabled,
        "starting detour gateway"
    );

    match config.storage {
        StorageBackendArg::InMemory => run_server(&config, InMemoryMappingStore::new()).await,
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlMappingStore::connect(mysql_dsn).await?;
            store.ensure_schema().await?;
            run_server(&config, store).await
        }
    }
}

async fn run_server<S: MappingStore>(config: &CLI, store: S) -> anyhow::Result<()> {
    let store = Arc::new(store);
    let last = store.all().await?.iter().map(|mapping| mapping.id).max();
    let generator = Arc::new(SeqGenerator::resume_after(last));
    let hierarchy = Arc::new(InMemoryHierarchy::with_policy(config.path_policy()));

    let state = AppState::new(store, hierarchy, generator, config.settings());

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
