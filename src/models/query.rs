//! Query, schema and export DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /query`
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "SQL is required"))]
    pub sql: String,
    #[validate(length(min = 1, message = "Database name is required"))]
    pub db_name: String,
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
}

/// Query string of `GET /schema`; a missing name selects the default store
#[derive(Debug, Deserialize)]
pub struct SchemaQuery {
    pub db_name: Option<String>,
}

/// Query string of `GET /export_json`
#[derive(Debug, Deserialize, Validate)]
pub struct ExportQuery {
    #[validate(length(min = 1, message = "Database name is required"))]
    pub db_name: String,
    #[validate(length(min = 1, message = "Table name is required"))]
    pub table_name: String,
}

#[derive(Debug, Serialize)]
pub struct DatabaseListResponse {
    pub databases: Vec<String>,
}
