//! User management module
//!
//! Known users and their hashed shared credentials. Users are not persisted
//! entities: they come from configuration and only key permissions and
//! approval attributions.

use crate::auth::{hash_password, verify_password};
use crate::config::UserCredential;
use crate::error::AppError;
use tracing::{info, warn};

/// A known user with a bcrypt hash of their credential
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    password_hash: String,
}

/// Configured users in configuration order
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    /// Hash every configured credential once
    pub fn from_credentials(credentials: &[UserCredential], cost: u32) -> Result<Self, AppError> {
        let users = credentials
            .iter()
            .map(|c| {
                Ok(User {
                    username: c.username.clone(),
                    password_hash: hash_password(&c.password, cost)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        info!("Loaded {} users", users.len());
        Ok(Self { users })
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(|u| u.username.as_str())
    }

    /// Check a login attempt against the stored hash
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool, AppError> {
        match self.users.iter().find(|u| u.username == username) {
            Some(user) => verify_password(password, &user.password_hash),
            None => {
                warn!("Login attempt for unknown user: {}", username);
                Ok(false)
            }
        }
    }
}
