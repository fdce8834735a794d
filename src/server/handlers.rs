use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use super::AppState;
use super::caller::Caller;
use super::dto::{JsonRow, RowsQuery, TableRowsResponse, UpdateRowRequest, row_from_json, row_to_json};
use super::response::{ApiError, ApiResponse};
use crate::tables::{Filter, MutableTableSource, scan};

pub async fn list_tables(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let names = state.database.table_names()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(names)))
}

pub async fn get_table(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<RowsQuery>,
) -> impl IntoResponse {
    let table = state
        .database
        .table(&name)?
        .ok_or_else(|| ApiError::not_found("Table not found"))?;

    let filters: Vec<Filter> = query
        .commit_hashes()
        .map(|hashes| Filter::any_of("commit_hash", hashes))
        .into_iter()
        .collect();

    let columns = table.columns();
    let rows = scan(table.as_ref(), &filters)?
        .into_iter()
        .map(|row| row_to_json(&columns, row))
        .collect::<crate::error::Result<Vec<_>>>()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TableRowsResponse {
        name: table.name().to_string(),
        columns,
        rows,
    })))
}

fn mutable_table(state: &AppState, name: &str) -> Result<Box<dyn MutableTableSource>, ApiError> {
    state
        .database
        .mutable_table(name)
        .ok_or_else(|| ApiError::bad_request("Table is read-only"))
}

pub async fn insert_row(
    Caller(session): Caller,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<JsonRow>,
) -> impl IntoResponse {
    let table = mutable_table(&state, &name)?;
    let row = row_from_json(&table.columns(), &body)?;

    table.insert(Some(&session), &row)?;
    table.close()?;
    debug!(table = %name, user = %session.user, "Inserted row");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(body))))
}

pub async fn update_row(
    Caller(session): Caller,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<UpdateRowRequest>,
) -> impl IntoResponse {
    let table = mutable_table(&state, &name)?;
    let columns = table.columns();
    let old = row_from_json(&columns, &body.old)?;
    let new = row_from_json(&columns, &body.new)?;

    table.update(Some(&session), &old, &new)?;
    table.close()?;
    debug!(table = %name, user = %session.user, "Updated row");

    Ok::<_, ApiError>(Json(ApiResponse::success(body.new)))
}

pub async fn delete_row(
    Caller(session): Caller,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<JsonRow>,
) -> impl IntoResponse {
    let table = mutable_table(&state, &name)?;
    let row = row_from_json(&table.columns(), &body)?;

    table.delete(Some(&session), &row)?;
    table.close()?;
    debug!(table = %name, user = %session.user, "Deleted row");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
