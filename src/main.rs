//! myfancrm - creator operations console
//!
//! Serves the console API and drives subscriber conversations through a
//! pure progression engine, answering with an external personality-chat
//! service.

mod api;
mod chat_backend;
mod db;
mod paywall;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use chat_backend::{BackendConfig, SinhomeClient};
use db::Database;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "myfancrm=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("MYFANCRM_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.myfancrm/myfancrm.sqlite3")
    });

    let port: u16 = std::env::var("MYFANCRM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8010);

    let history_limit: usize = std::env::var("MYFANCRM_HISTORY_LIMIT")
        .ok()
        .and_then(|n| n.parse().ok())
        .unwrap_or(runtime::DEFAULT_HISTORY_LIMIT);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Exactly one bot, the creator
    let bot = db.ensure_single_creator()?;
    tracing::info!(bot_id = bot.id, name = %bot.name, "Creator bot ready");

    // Chat backend
    let backend_config = BackendConfig::from_env();
    tracing::info!(
        base_url = %backend_config.base_url,
        timeout_secs = backend_config.timeout_secs,
        "Chat backend configured"
    );
    let backend = Arc::new(SinhomeClient::new(&backend_config)?);

    // Create application state
    let state = AppState::new(db, backend, history_limit);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("myfancrm listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
