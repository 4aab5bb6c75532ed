use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

use server::config::AppConfig;
use server::state::AppState;
use server::store::SqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = server::database::init_db(&config.database)
        .await
        .context("Failed to initialize database")?;

    let blobs: Arc<dyn BlobStore> = Arc::new(
        FilesystemBlobStore::new(config.storage.root.clone())
            .await
            .with_context(|| {
                format!(
                    "Failed to open storage at {}",
                    config.storage.root.display()
                )
            })?,
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        config: config.clone(),
        store: Arc::new(SqlStore::new(db, Arc::clone(&blobs))),
        shutdown: shutdown.clone(),
    };

    let app = server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    blobs.close().await;
    info!("Server stopped");

    Ok(())
}

/// Resolve on Ctrl+C and cancel in-flight sagas.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
