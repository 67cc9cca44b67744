//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod approval;
mod auth;
mod query;

use crate::config::Settings;
use crate::error::{ApiResult, AppError};
use crate::state::{AppState, SharedState};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Login, users and permissions
        .route("/login", post(auth::login))
        .route("/users", get(auth::list_users))
        .route(
            "/users/{username}/permissions",
            get(auth::list_permissions)
                .post(auth::grant_permission)
                .delete(auth::revoke_permission),
        )

        // Direct queries and introspection
        .route("/query", post(query::run_query))
        .route("/list_dbs", get(query::list_databases))
        .route("/schema", get(query::get_schema))
        .route("/export_json", get(query::export_json))

        // Approval workflow
        .route("/approval_requests", get(approval::list_requests))
        .route("/submit_for_approval", post(approval::submit))
        .route("/approval_requests/{id}/approve", post(approval::approve))
        .route("/approval_requests/{id}/decline", post(approval::decline))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Run datastore work off the async runtime
pub(crate) async fn run_blocking<T, F>(state: &SharedState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
