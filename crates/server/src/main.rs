use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schooldesk_server::{
    build_router, config, db, services::accounts, services::storage::BlobStore, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schooldesk_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env();

    // Ensure blob storage exists
    let blobs = BlobStore::new(&config.storage_path);
    blobs.init().await?;

    // Initialize database
    let db = db::Database::connect(&config.database_url, config.database_max_connections).await?;
    db.run_migrations().await?;

    if let Some(admin) = &config.bootstrap_admin {
        accounts::ensure_bootstrap_admin(&db.pool, admin).await?;
    }

    let port = config.port;
    let app = build_router(AppState { db, config, blobs });

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
