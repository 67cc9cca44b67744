//! sqlgate - governed SQL gateway
//!
//! Serves named SQLite stores over HTTP. Direct statements pass a
//! per-user permission gate; mutating statements can instead be submitted
//! for review, snapshotted at submission and executed on approval.

mod approval;
mod auth;
mod config;
mod db;
mod error;
mod gateway;
mod models;
mod routes;
mod snapshot;
mod state;
mod statement;
mod users;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting sqlgate...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Create the admin store, governance tables and default permissions
    let bootstrap_settings = settings.clone();
    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(&bootstrap_settings)).await??;
    let state = Arc::new(state);
    info!("✅ Admin store '{}' initialized", settings.storage.admin_db_name);

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET    /health                          - Health check");
    info!("   POST   /login                           - Check credentials");
    info!("   GET    /users                           - List users");
    info!("   GET    /users/{{username}}/permissions    - List permissions");
    info!("   POST   /users/{{username}}/permissions    - Grant permission");
    info!("   DELETE /users/{{username}}/permissions    - Revoke permission");
    info!("   POST   /query                           - Run a statement");
    info!("   GET    /list_dbs                        - List stores");
    info!("   GET    /schema                          - Describe a store");
    info!("   GET    /export_json                     - Export a table");
    info!("   GET    /approval_requests               - List approval requests");
    info!("   POST   /submit_for_approval             - Submit a statement for review");
    info!("   POST   /approval_requests/{{id}}/approve  - Approve and execute");
    info!("   POST   /approval_requests/{{id}}/decline  - Decline");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlgate=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
