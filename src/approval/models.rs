//! Approval request data models

use crate::db::Row;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Review status; `Approved` and `Declined` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Declined,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "declined" => Ok(ApprovalStatus::Declined),
            other => Err(AppError::Internal(format!("Unknown approval status: {}", other))),
        }
    }
}

/// A mutating statement submitted for review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub id: i64,
    /// Submitting user
    pub user: String,
    /// Statement text exactly as submitted
    pub sql: String,
    pub status: ApprovalStatus,
    pub submitted_at: DateTime<Utc>,
    /// Reviewer who resolved the request, also set when approval downgraded to decline
    pub approved_by: Option<String>,
    pub target_db: Option<String>,
    /// Pre-submission table export, absent when none could be taken
    pub snapshot_path: Option<String>,
}

impl ApprovalRequest {
    /// Decode a row of `approval_requests`
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::Internal("approval request without id".to_string()))?;

        let submitted_at = required_text(row, "submitted_at")?;
        let submitted_at = DateTime::parse_from_rfc3339(&submitted_at)
            .map_err(|e| AppError::Internal(format!("Bad submitted_at on request {}: {}", id, e)))?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            user: required_text(row, "user")?,
            sql: required_text(row, "sql")?,
            status: required_text(row, "status")?.parse()?,
            submitted_at,
            approved_by: optional_text(row, "approved_by"),
            target_db: optional_text(row, "target_db"),
            snapshot_path: optional_text(row, "snapshot_path"),
        })
    }
}

fn required_text(row: &Row, column: &str) -> Result<String, AppError> {
    optional_text(row, column)
        .ok_or_else(|| AppError::Internal(format!("approval request missing {}", column)))
}

fn optional_text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(String::from)
}
