//! Login, user and permission route handlers

use super::run_blocking;
use crate::auth::Permission;
use crate::error::{validation_error, ApiResult};
use crate::models::{
    LoginFailure, LoginRequest, PermissionListResponse, PermissionRequest, SuccessResponse,
    UserListResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};
use validator::Validate;

/// Check a shared credential. No token is issued.
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Response> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    info!("Login attempt for user: {}", payload.username);

    let username = payload.username.clone();
    let accepted = run_blocking(&state, move |state| {
        state.users.authenticate(&payload.username, &payload.password)
    })
    .await?;

    if accepted {
        info!("User '{}' logged in successfully", username);
        Ok(Json(SuccessResponse::ok()).into_response())
    } else {
        warn!("Failed login attempt for user: {}", username);
        Ok((
            StatusCode::UNAUTHORIZED,
            Json(LoginFailure {
                detail: "Invalid credentials".to_string(),
            }),
        )
            .into_response())
    }
}

/// Configured users in configuration order
pub async fn list_users(State(state): State<SharedState>) -> Json<UserListResponse> {
    Json(UserListResponse {
        users: state.users.usernames().map(String::from).collect(),
    })
}

pub async fn list_permissions(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> ApiResult<Json<PermissionListResponse>> {
    let permissions =
        run_blocking(&state, move |state| state.permissions.permissions_of(&username)).await?;

    Ok(Json(PermissionListResponse {
        permissions: permissions.into_iter().collect(),
    }))
}

pub async fn grant_permission(
    State(state): State<SharedState>,
    Path(username): Path<String>,
    Json(payload): Json<PermissionRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let permission: Permission = payload.permission.parse()?;

    run_blocking(&state, move |state| state.permissions.grant(&username, permission)).await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn revoke_permission(
    State(state): State<SharedState>,
    Path(username): Path<String>,
    Json(payload): Json<PermissionRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let permission: Permission = payload.permission.parse()?;

    run_blocking(&state, move |state| state.permissions.revoke(&username, permission)).await?;
    Ok(Json(SuccessResponse::ok()))
}
