//! Application state management
//!
//! Contains shared state accessible across all handlers. Construction is
//! the explicit startup routine: it creates the administrative store, both
//! governance tables, and seeds default permissions.

use crate::approval::ApprovalWorkflow;
use crate::auth::PermissionAuthority;
use crate::config::Settings;
use crate::db::{Datastore, SqliteStore};
use crate::error::AppError;
use crate::gateway::QueryGateway;
use crate::users::UserDirectory;
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers
pub struct AppState {
    /// Named stores, admin store included
    pub store: Arc<dyn Datastore>,

    /// Capability lookups and grants
    pub permissions: Arc<PermissionAuthority>,

    /// Permission-gated direct execution
    pub gateway: QueryGateway,

    /// Review workflow for mutating statements
    pub approvals: ApprovalWorkflow,

    /// Known users and their credentials
    pub users: UserDirectory,
}

impl AppState {
    /// Build state from settings and run the idempotent initialization
    pub fn bootstrap(settings: &Settings) -> Result<Self, AppError> {
        let sqlite = SqliteStore::new(settings.storage.dbs_dir.clone());
        sqlite.ensure_database(&settings.storage.admin_db_name)?;
        info!("Stores directory: {}", sqlite.dbs_dir().display());

        let users = UserDirectory::from_credentials(&settings.auth.users, settings.auth.bcrypt_cost)?;
        let state = Self::new(Arc::new(sqlite), &settings.storage.admin_db_name, users);

        state.permissions.ensure_schema()?;
        state.approvals.ensure_schema()?;
        state.permissions.seed_defaults(state.users.usernames())?;

        info!("Governance tables ready in '{}'", settings.storage.admin_db_name);
        Ok(state)
    }

    pub fn new(store: Arc<dyn Datastore>, admin_db: &str, users: UserDirectory) -> Self {
        let permissions = Arc::new(PermissionAuthority::new(store.clone(), admin_db));

        Self {
            gateway: QueryGateway::new(store.clone(), permissions.clone(), admin_db),
            approvals: ApprovalWorkflow::new(store.clone(), admin_db),
            permissions,
            store,
            users,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
