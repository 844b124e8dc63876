use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use shelf::api::{
    create_auth_router, create_upload_router, run_state_cleanup, AuthAppState, ProviderConfig,
    StateManager, UploadAppState,
};
use shelf::config::{self, Secrets, ShelfConfig};
use shelf::directory::DirectoryStore;
use shelf::drive::DriveClient;
use shelf::session::Sessions;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf=info".into()),
        )
        .init();

    info!("Shelf starting...");

    let mut config = load_config()?;
    if let Ok(name) = std::env::var("SHELF_ROOT_FOLDER_NAME") {
        config.drive.root_folder_name = name;
    }

    // Required secrets; process start fails when absent or malformed
    let secrets = Secrets::from_env()?;

    // Shared handles, constructed exactly once and reused by every request
    let directory = Arc::new(
        DirectoryStore::new(&config.store.db_path, &secrets.encryption_key)
            .context("Failed to open user directory store")?,
    );
    let drive = Arc::new(DriveClient::new());
    let sessions = Sessions::new(&secrets.session_secret, config.session.ttl_seconds);
    let state_manager = StateManager::new(config.session.state_expiry_seconds);

    tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.session.state_cleanup_interval_seconds,
    ));

    let auth_state = AuthAppState {
        directory: directory.clone(),
        drive: drive.clone(),
        sessions: sessions.clone(),
        state_manager,
        provider: ProviderConfig::google(&secrets),
        public_base_url: config.server.public_base_url.clone(),
        root_folder_name: config.drive.root_folder_name.clone(),
    };

    let upload_state = UploadAppState {
        directory,
        drive,
        sessions,
        body_limit_bytes: config.upload.body_limit_bytes,
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(create_auth_router(auth_state))
        .merge(create_upload_router(upload_state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!("Listening on {}", config.server.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Resolve configuration: `SHELF_CONFIG` wins, then `shelf.toml` in the
/// working directory, then built-in defaults.
fn load_config() -> Result<ShelfConfig> {
    if let Ok(path) = std::env::var("SHELF_CONFIG") {
        info!("Loading configuration from {}", path);
        return config::load_config(&path);
    }
    if std::path::Path::new("shelf.toml").exists() {
        info!("Loading configuration from shelf.toml");
        return config::load_config("shelf.toml");
    }
    Ok(ShelfConfig::default())
}

async fn health() -> &'static str {
    "ok"
}
