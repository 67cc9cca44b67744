//! Approval workflow DTOs

use crate::approval::ApprovalRequest;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /submit_for_approval`
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitApprovalRequest {
    #[validate(length(min = 1, message = "User is required"))]
    pub user: String,
    #[validate(length(min = 1, message = "SQL is required"))]
    pub sql: String,
    #[validate(length(min = 1, message = "Target database is required"))]
    pub target_db: String,
}

/// Body of the approve and decline endpoints
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(min = 1, message = "Approver is required"))]
    pub approver: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitApprovalResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct ApprovalListResponse {
    pub requests: Vec<ApprovalRequest>,
}
