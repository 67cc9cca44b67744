//! Direct query, schema and export route handlers

use super::run_blocking;
use crate::db::queries::SqlBuilder;
use crate::error::{validation_error, ApiResult};
use crate::gateway::QueryResult;
use crate::models::{DatabaseListResponse, ExportQuery, OutcomeResponse, QueryRequest, SchemaQuery};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error, info};
use validator::Validate;

/// Run a statement through the permission gate
pub async fn run_query(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> ApiResult<Json<QueryResult>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    debug!("Statement from '{}': {}", payload.username, payload.sql);

    let result = run_blocking(&state, move |state| {
        state
            .gateway
            .run_query(&payload.username, &payload.db_name, &payload.sql)
    })
    .await?;

    Ok(Json(result))
}

pub async fn list_databases(
    State(state): State<SharedState>,
) -> ApiResult<Json<DatabaseListResponse>> {
    let databases = run_blocking(&state, |state| state.store.list_databases()).await?;
    info!("Listing databases: {:?}", databases);
    Ok(Json(DatabaseListResponse { databases }))
}

/// Describe a store. Any failure is reported inside the body.
pub async fn get_schema(
    State(state): State<SharedState>,
    Query(params): Query<SchemaQuery>,
) -> ApiResult<Response> {
    let db_name = params.db_name.clone();
    let described = run_blocking(&state, move |state| {
        Ok(state.store.schema(params.db_name.as_deref()))
    })
    .await?;

    let label = db_name.unwrap_or_default();
    match described {
        Ok(schema) => {
            info!("Schema fetched for DB '{}'", schema.db);
            Ok(Json(schema).into_response())
        }
        Err(e) => {
            error!("Error fetching schema for DB '{}': {}", label, e);
            Ok(Json(json!({"db": label, "schemas": {}, "error": e.to_string()})).into_response())
        }
    }
}

/// All rows of one table as a bare JSON array
pub async fn export_json(
    State(state): State<SharedState>,
    Query(params): Query<ExportQuery>,
) -> ApiResult<Response> {
    params.validate().map_err(|e| validation_error(e.to_string()))?;

    let exported = run_blocking(&state, move |state| {
        Ok(SqlBuilder::select_all(&params.table_name).and_then(|sql| {
            state.store.execute(Some(&params.db_name), &sql, &[])
        }))
    })
    .await?;

    match exported {
        Ok(outcome) => Ok(Json(outcome.into_rows()).into_response()),
        Err(e) => {
            error!("Export failed: {}", e);
            Ok(Json(OutcomeResponse::failed(e.to_string())).into_response())
        }
    }
}
