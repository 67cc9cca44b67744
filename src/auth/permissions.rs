//! Permission authority
//!
//! Resolves the capability set of a user from the `user_permissions` fact
//! table in the administrative store. The admin user is answered from the
//! enumeration itself and never touches the table.

use super::{Permission, ADMIN_USER, GUEST_USER};
use crate::db::queries::{
    CREATE_USER_PERMISSIONS, GRANT_PERMISSION, REVOKE_PERMISSION, SELECT_PERMISSIONS,
};
use crate::db::{Datastore, SqlParam};
use crate::error::AppError;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PermissionAuthority {
    store: Arc<dyn Datastore>,
    admin_db: String,
}

impl PermissionAuthority {
    pub fn new(store: Arc<dyn Datastore>, admin_db: impl Into<String>) -> Self {
        Self {
            store,
            admin_db: admin_db.into(),
        }
    }

    pub fn ensure_schema(&self) -> Result<(), AppError> {
        self.store
            .execute(Some(&self.admin_db), CREATE_USER_PERMISSIONS, &[])?;
        Ok(())
    }

    /// Grant the default set to every user except admin and guest.
    /// Safe to run on every startup; returns the number of new facts.
    pub fn seed_defaults<'a, I>(&self, users: I) -> Result<usize, AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut granted = 0;
        for user in users {
            if user == ADMIN_USER || user == GUEST_USER {
                continue;
            }
            for permission in Permission::DEFAULTS {
                granted += self.insert_fact(user, permission)?;
            }
        }
        info!("Seeded default permissions ({} new grants)", granted);
        Ok(granted)
    }

    /// Current capability set of `user`
    pub fn permissions_of(&self, user: &str) -> Result<BTreeSet<Permission>, AppError> {
        if user == ADMIN_USER {
            return Ok(Permission::ALL.into_iter().collect());
        }

        let rows = self
            .store
            .execute(Some(&self.admin_db), SELECT_PERMISSIONS, &[text(user)])?
            .into_rows();

        let mut permissions = BTreeSet::new();
        for row in rows {
            let token = row.get("permission").and_then(Value::as_str).unwrap_or_default();
            match token.parse::<Permission>() {
                Ok(p) => {
                    permissions.insert(p);
                }
                Err(_) => warn!("Ignoring unknown permission '{}' stored for '{}'", token, user),
            }
        }
        Ok(permissions)
    }

    pub fn has(&self, user: &str, permission: Permission) -> Result<bool, AppError> {
        Ok(self.permissions_of(user)?.contains(&permission))
    }

    /// Idempotent; granting to admin is a no-op
    pub fn grant(&self, user: &str, permission: Permission) -> Result<(), AppError> {
        if user == ADMIN_USER {
            debug!("Ignoring grant of {} to {}", permission, ADMIN_USER);
            return Ok(());
        }
        if self.insert_fact(user, permission)? > 0 {
            info!("Granted {} to '{}'", permission, user);
        }
        Ok(())
    }

    /// Idempotent; revoking from admin is a no-op
    pub fn revoke(&self, user: &str, permission: Permission) -> Result<(), AppError> {
        if user == ADMIN_USER {
            debug!("Ignoring revoke of {} from {}", permission, ADMIN_USER);
            return Ok(());
        }
        let outcome = self.store.execute(
            Some(&self.admin_db),
            REVOKE_PERMISSION,
            &[text(user), text(permission.as_str())],
        )?;
        if outcome.rows_affected() > 0 {
            info!("Revoked {} from '{}'", permission, user);
        }
        Ok(())
    }

    fn insert_fact(&self, user: &str, permission: Permission) -> Result<usize, AppError> {
        let outcome = self.store.execute(
            Some(&self.admin_db),
            GRANT_PERMISSION,
            &[text(user), text(permission.as_str())],
        )?;
        Ok(outcome.rows_affected())
    }
}

fn text(value: &str) -> SqlParam {
    SqlParam::Text(value.to_string())
}
