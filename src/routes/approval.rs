//! Approval workflow route handlers

use super::run_blocking;
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{
    ApprovalListResponse, OutcomeResponse, ReviewRequest, SubmitApprovalRequest,
    SubmitApprovalResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, warn};
use validator::Validate;

pub async fn list_requests(
    State(state): State<SharedState>,
) -> ApiResult<Json<ApprovalListResponse>> {
    info!("Fetching all approval requests");
    let requests = run_blocking(&state, |state| state.approvals.list()).await?;
    Ok(Json(ApprovalListResponse { requests }))
}

pub async fn submit(
    State(state): State<SharedState>,
    Json(payload): Json<SubmitApprovalRequest>,
) -> ApiResult<Json<SubmitApprovalResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    info!(
        "User '{}' submitting query for approval on DB '{}'",
        payload.user, payload.target_db
    );

    let id = run_blocking(&state, move |state| {
        state
            .approvals
            .submit(&payload.user, &payload.sql, &payload.target_db)
    })
    .await?;

    info!("Approval request submitted with id {}", id);
    Ok(Json(SubmitApprovalResponse { success: true, id }))
}

pub async fn approve(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Json<OutcomeResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    info!("User '{}' attempting to approve request id {}", payload.approver, id);

    let approver = payload.approver.clone();
    let result = run_blocking(&state, move |state| state.approvals.approve(id, &approver)).await;
    review_outcome("Approval", id, &payload.approver, result)
}

pub async fn decline(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Json<OutcomeResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    info!("User '{}' attempting to decline request id {}", payload.approver, id);

    let decliner = payload.approver.clone();
    let result = run_blocking(&state, move |state| state.approvals.decline(id, &decliner)).await;
    review_outcome("Decline", id, &payload.approver, result)
}

/// Governance failures become `{success: false, error}`; faults propagate
fn review_outcome(
    action: &str,
    id: i64,
    reviewer: &str,
    result: Result<(), AppError>,
) -> ApiResult<Json<OutcomeResponse>> {
    match result {
        Ok(()) => Ok(Json(OutcomeResponse::ok())),
        Err(e) if e.is_structured_failure() => {
            warn!("{} failed for request {} by '{}': {}", action, id, reviewer, e);
            Ok(Json(OutcomeResponse::failed(e.to_string())))
        }
        Err(e) => Err(e),
    }
}
