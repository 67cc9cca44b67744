//! SQL query constants and builders
//!
//! Contains all SQL queries used by the application.

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tables and views of a SQLite store
pub const LIST_OBJECTS: &str = r#"
    SELECT name, type
    FROM sqlite_master
    WHERE type IN ('table', 'view')
"#;

/// Columns of one table or view
pub const GET_COLUMNS: &str = "SELECT name, type FROM pragma_table_info(?1)";

/// Permission facts table
pub const CREATE_USER_PERMISSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        username TEXT NOT NULL,
        permission TEXT NOT NULL,
        PRIMARY KEY (username, permission)
    )
"#;

pub const SELECT_PERMISSIONS: &str =
    "SELECT permission FROM user_permissions WHERE username = ?1";

pub const GRANT_PERMISSION: &str =
    "INSERT OR IGNORE INTO user_permissions (username, permission) VALUES (?1, ?2)";

pub const REVOKE_PERMISSION: &str =
    "DELETE FROM user_permissions WHERE username = ?1 AND permission = ?2";

/// Approval requests table
pub const CREATE_APPROVAL_REQUESTS: &str = r#"
    CREATE TABLE IF NOT EXISTS approval_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user TEXT NOT NULL,
        sql TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        submitted_at TEXT NOT NULL,
        approved_by TEXT,
        target_db TEXT,
        snapshot_path TEXT
    )
"#;

pub const INSERT_APPROVAL_REQUEST: &str = r#"
    INSERT INTO approval_requests (user, sql, status, submitted_at, target_db, snapshot_path)
    VALUES (?1, ?2, 'pending', ?3, ?4, ?5)
"#;

pub const LIST_APPROVAL_REQUESTS: &str = r#"
    SELECT id, user, sql, status, submitted_at, approved_by, target_db, snapshot_path
    FROM approval_requests
    ORDER BY submitted_at DESC, id DESC
"#;

pub const GET_APPROVAL_REQUEST: &str = r#"
    SELECT id, user, sql, status, submitted_at, approved_by, target_db, snapshot_path
    FROM approval_requests
    WHERE id = ?1
"#;

/// Terminal transition; only a pending row is ever touched
pub const RESOLVE_APPROVAL_REQUEST: &str = r#"
    UPDATE approval_requests
    SET status = ?1, approved_by = ?2
    WHERE id = ?3 AND status = 'pending'
"#;

/// Plain or schema-qualified identifier
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
        .expect("identifier pattern is valid")
});

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Validate and quote a possibly schema-qualified table name
    pub fn table_ref(table: &str) -> Result<String, AppError> {
        if !IDENTIFIER.is_match(table) {
            return Err(AppError::Validation(format!("Invalid table name: {}", table)));
        }
        Ok(table
            .split('.')
            .map(Self::quote_ident)
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Build a full-table read
    pub fn select_all(table: &str) -> Result<String, AppError> {
        Ok(format!("SELECT * FROM {}", Self::table_ref(table)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(SqlBuilder::quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_select_all() {
        assert_eq!(SqlBuilder::select_all("orders").unwrap(), "SELECT * FROM \"orders\"");
        assert_eq!(
            SqlBuilder::select_all("main.orders").unwrap(),
            "SELECT * FROM \"main\".\"orders\""
        );
    }

    #[test]
    fn test_select_all_rejects_injection() {
        assert!(SqlBuilder::select_all("t; DROP TABLE x").is_err());
        assert!(SqlBuilder::select_all("t--").is_err());
        assert!(SqlBuilder::select_all("").is_err());
        assert!(SqlBuilder::select_all("a.b.c").is_err());
    }
}
