//! Query gateway
//!
//! Permission-gated direct execution. Reads need `view_data`, writes need
//! `edit_records`. Routing a write through review is the caller's choice;
//! this path never consults the approval workflow. The administrative store
//! only accepts reads here, so governance rows change only through their
//! own operations.

use crate::auth::{Permission, PermissionAuthority};
use crate::db::{Datastore, QueryOutcome};
use crate::error::AppError;
use crate::statement::{classify, StatementKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Structured result of one gateway call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    fn ok(outcome: QueryOutcome) -> Self {
        Self {
            success: true,
            result: Some(outcome),
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

pub struct QueryGateway {
    store: Arc<dyn Datastore>,
    permissions: Arc<PermissionAuthority>,
    admin_db: String,
}

impl QueryGateway {
    pub fn new(
        store: Arc<dyn Datastore>,
        permissions: Arc<PermissionAuthority>,
        admin_db: impl Into<String>,
    ) -> Self {
        Self {
            store,
            permissions,
            admin_db: admin_db.into(),
        }
    }

    /// Capability a statement of `kind` requires
    pub fn required_permission(kind: StatementKind) -> Permission {
        match kind {
            StatementKind::Read => Permission::ViewData,
            StatementKind::Write => Permission::EditRecords,
        }
    }

    /// Check the caller's capability and run the statement.
    ///
    /// Denials and execution failures come back as `success: false`. Only a
    /// failure to read the caller's permissions is returned as an error.
    pub fn run_query(&self, user: &str, db_name: &str, sql: &str) -> Result<QueryResult, AppError> {
        info!("User '{}' executing query on DB '{}'", user, db_name);

        let kind = classify(sql);
        let required = Self::required_permission(kind);

        if !self.permissions.has(user, required)? {
            warn!("User '{}' denied {} permission on DB '{}'", user, required, db_name);
            let message = match kind {
                StatementKind::Read => "No permission to view data.",
                StatementKind::Write => "No permission to modify data.",
            };
            return Ok(QueryResult::failed(AppError::PermissionDenied(message.to_string()).to_string()));
        }

        if kind == StatementKind::Write && self.is_admin_store(db_name) {
            warn!("User '{}' attempted a direct write to the admin store", user);
            return Ok(QueryResult::failed(
                AppError::PermissionDenied("The administrative store is read-only here.".to_string())
                    .to_string(),
            ));
        }

        match self.store.execute(Some(db_name), sql, &[]) {
            Ok(outcome) => {
                info!("Query executed successfully for user '{}'", user);
                Ok(QueryResult::ok(outcome))
            }
            Err(e) => {
                error!("Query execution error for user '{}': {}", user, e);
                Ok(QueryResult::failed(e.to_string()))
            }
        }
    }

    fn is_admin_store(&self, db_name: &str) -> bool {
        let name = db_name.trim();
        name.strip_suffix(".db").unwrap_or(name) == self.admin_db
    }
}
