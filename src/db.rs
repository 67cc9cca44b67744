//! Datastore access
//!
//! A datastore is a named logical database. Every call resolves the name,
//! opens a fresh connection, runs exactly one statement and releases the
//! connection before returning. Nothing is pooled and no transaction spans
//! two calls.

pub mod queries;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::AppError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One result row, column name to value, in result-set column order
pub type Row = Map<String, Value>;

/// Bound statement parameter
pub type SqlParam = rusqlite::types::Value;

/// Outcome of executing one statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// Rows of a read, in result-set order
    Rows(Vec<Row>),
    /// Acknowledgment of a committed write
    Ack(WriteAck),
}

impl QueryOutcome {
    /// Rows of a read; a write yields no rows
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutcome::Rows(rows) => rows,
            QueryOutcome::Ack(_) => Vec::new(),
        }
    }

    pub fn rows_affected(&self) -> usize {
        match self {
            QueryOutcome::Rows(_) => 0,
            QueryOutcome::Ack(ack) => ack.rows_affected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteAck {
    pub message: String,
    pub rows_affected: usize,
    #[serde(skip)]
    pub last_insert_id: i64,
}

impl WriteAck {
    pub fn new(rows_affected: usize, last_insert_id: i64) -> Self {
        Self {
            message: "Query executed successfully.".to_string(),
            rows_affected,
            last_insert_id,
        }
    }
}

/// Column as reported by schema introspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnDescription {
    /// Stand-in for an object whose columns could not be read
    pub fn unavailable() -> Self {
        Self {
            name: "(unavailable)".to_string(),
            data_type: String::new(),
        }
    }
}

/// Schema of one store: schema name -> "object (kind)" -> columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescription {
    pub db: String,
    pub schemas: Map<String, Value>,
}

/// Access to named relational stores
pub trait Datastore: Send + Sync {
    /// Resolve a logical name to its physical location. `None` selects the
    /// default store.
    fn resolve(&self, db_name: Option<&str>) -> Result<PathBuf, AppError>;

    /// Execute one statement. Reads return rows, writes an acknowledgment.
    fn execute(
        &self,
        db_name: Option<&str>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<QueryOutcome, AppError>;

    /// Tables and views of a store with their columns
    fn schema(&self, db_name: Option<&str>) -> Result<SchemaDescription, AppError>;

    /// Logical names of every discoverable store
    fn list_databases(&self) -> Result<Vec<String>, AppError>;
}
