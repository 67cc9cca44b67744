//! Authentication and authorization module
//!
//! Capability tokens, the permission authority that resolves them per user,
//! and the password hashing used by the shared-credential login.

mod password;
mod permissions;

pub use password::{hash_password, verify_password};
pub use permissions::PermissionAuthority;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Holds every permission implicitly; never stored
pub const ADMIN_USER: &str = "admin";

/// Receives no implicit grants at initialization
pub const GUEST_USER: &str = "guest";

/// Capability tokens a user may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Login,
    SelectEnv,
    ViewData,
    ApplyFilters,
    EditRecords,
    SubmitForApproval,
    ApproveChanges,
    ManageRoles,
}

impl Permission {
    /// Every permission, in canonical order
    pub const ALL: [Permission; 8] = [
        Permission::Login,
        Permission::SelectEnv,
        Permission::ViewData,
        Permission::ApplyFilters,
        Permission::EditRecords,
        Permission::SubmitForApproval,
        Permission::ApproveChanges,
        Permission::ManageRoles,
    ];

    /// Granted to every known user other than admin and guest at startup
    pub const DEFAULTS: [Permission; 5] = [
        Permission::Login,
        Permission::SelectEnv,
        Permission::ViewData,
        Permission::ApplyFilters,
        Permission::SubmitForApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Login => "login",
            Permission::SelectEnv => "select_env",
            Permission::ViewData => "view_data",
            Permission::ApplyFilters => "apply_filters",
            Permission::EditRecords => "edit_records",
            Permission::SubmitForApproval => "submit_for_approval",
            Permission::ApproveChanges => "approve_changes",
            Permission::ManageRoles => "manage_roles",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown permission: {}", s)))
    }
}
