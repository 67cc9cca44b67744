//! Data models and DTOs (Data Transfer Objects)
//!
//! Request and response bodies of the HTTP surface.

pub mod approval;
pub mod query;
pub mod user;

pub use approval::*;
pub use query::*;
pub use user::*;

use serde::Serialize;

/// Bare success acknowledgment
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Outcome of an operation that can fail without a transport fault
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
