use codeshelf_api::{apply_middleware, create_router, health, AppState};
use codeshelf_core::{GatewayConfig, PgMetadataStore};
use codeshelf_storage::HttpStorageBackend;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server exited with error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    health::mark_server_start();
    let config = GatewayConfig::from_env();

    tracing::info!(
        "Connecting to database (max_conn: {}, min_conn: {})...",
        config.db_max_connections,
        config.db_min_connections
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await?;

    let metadata = Arc::new(PgMetadataStore::new(pool));
    metadata.migrate().await?;
    tracing::info!("Database connected and migrations applied");

    let storage = HttpStorageBackend::new(&config.storage_url, config.storage_timeout)?;
    tracing::info!("Relaying uploads to storage server at {}", storage.base_url());

    let state = Arc::new(AppState {
        metadata: metadata.clone(),
        storage: Arc::new(storage),
        max_upload_bytes: config.max_upload_bytes,
        strict_uploads: config.strict_uploads,
    });

    let app = apply_middleware(create_router(state), &config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing database pool");
    metadata.pool().close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
