//! Login, user and permission DTOs

use crate::auth::Permission;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /login`
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    pub password: String,
}

/// Body of the grant and revoke endpoints; the token is parsed by the handler
#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub permission: String,
}

/// Rejected login, shaped as `{detail}`
#[derive(Debug, Serialize)]
pub struct LoginFailure {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PermissionListResponse {
    pub permissions: Vec<Permission>,
}
