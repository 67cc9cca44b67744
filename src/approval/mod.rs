//! Approval module - review gate for mutating statements
//!
//! A submitted statement waits as `pending` until a reviewer approves it,
//! which executes the statement, or declines it.

mod models;
mod store;

pub use models::ApprovalRequest;
pub use store::ApprovalWorkflow;
