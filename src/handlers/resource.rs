//! Generic CRUD handlers. Every registered resource gets the same set:
//! list, create, read, update, patch, delete, options. Handlers resolve the
//! resource by path segment; mutations run in one transaction and commit
//! only on success.

use crate::error::AppError;
use crate::handlers::output;
use crate::projection;
use crate::query::QueryOptions;
use crate::resource::{Operation, Resource};
use crate::service::{parse_id, CrudService};
use crate::state::AppState;
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn resolve<'a>(
    state: &'a AppState,
    path_segment: &str,
    op: Operation,
) -> Result<&'a Resource, AppError> {
    let resource = state
        .registry
        .by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !resource.allows(op) {
        return Err(AppError::BadRequest(format!("{} not allowed", op.name())));
    }
    Ok(resource)
}

fn parse_opts(
    state: &AppState,
    resource: &Resource,
    query: &Option<String>,
) -> Result<QueryOptions, AppError> {
    QueryOptions::from_query_str(
        resource,
        state.registry.filter_policy,
        query.as_deref().unwrap_or(""),
    )
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let resource = resolve(&state, &path_segment, Operation::List)?;
    let opts = parse_opts(&state, resource, &query)?;
    let mut conn = state.pool.acquire().await?;
    let rows = CrudService::list(&mut conn, &state.registry, resource, &opts).await?;
    let rows = projection::project_many(&rows, &opts.fields)?;
    output::many(rows, &opts)
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let resource = resolve(&state, &path_segment, Operation::Create)?;
    let opts = parse_opts(&state, resource, &query)?;
    let body = body_to_map(body)?;
    let mut tx = state.pool.begin().await?;
    let row = CrudService::create(&mut tx, resource, &body).await?;
    tx.commit().await?;
    let row = projection::project(&row, &opts.fields)?;
    Ok((StatusCode::CREATED, output::one(row, &opts)?).into_response())
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let resource = resolve(&state, &path_segment, Operation::Read)?;
    let opts = parse_opts(&state, resource, &query)?;
    let id = parse_id(resource, &id_str)?;
    let mut conn = state.pool.acquire().await?;
    let row = CrudService::get(&mut conn, &state.registry, resource, &opts, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    let row = projection::project(&row, &opts.fields)?;
    output::one(row, &opts)
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let resource = resolve(&state, &path_segment, Operation::Update)?;
    let opts = parse_opts(&state, resource, &query)?;
    let id = parse_id(resource, &id_str)?;
    let body = body_to_map(body)?;
    let mut tx = state.pool.begin().await?;
    let row = CrudService::update(&mut tx, resource, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    tx.commit().await?;
    let row = projection::project(&row, &opts.fields)?;
    output::one(row, &opts)
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let resource = resolve(&state, &path_segment, Operation::Delete)?;
    let id = parse_id(resource, &id_str)?;
    let mut tx = state.pool.begin().await?;
    CrudService::delete(&mut tx, resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `Allow` methods for a resource, derived from its enabled operations.
fn allow_header(resource: &Resource) -> String {
    let mut methods = Vec::new();
    if resource.allows(Operation::List) || resource.allows(Operation::Read) {
        methods.push("GET");
    }
    if resource.allows(Operation::Create) {
        methods.push("POST");
    }
    if resource.allows(Operation::Update) {
        methods.push("PUT");
        methods.push("PATCH");
    }
    if resource.allows(Operation::Delete) {
        methods.push("DELETE");
    }
    methods.push("OPTIONS");
    methods.join(", ")
}

pub async fn options(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
) -> Result<Response, AppError> {
    let resource = state
        .registry
        .by_path(&path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::ALLOW, allow_header(resource))],
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    #[test]
    fn allow_header_reflects_enabled_operations() {
        let full = builtin::template_resource();
        assert_eq!(
            allow_header(&full),
            "GET, POST, PUT, PATCH, DELETE, OPTIONS"
        );

        let mut read_only = builtin::template_resource();
        read_only.operations = vec![Operation::List, Operation::Read];
        assert_eq!(allow_header(&read_only), "GET, OPTIONS");

        let mut write_only = builtin::template_resource();
        write_only.operations = vec![Operation::Create];
        assert_eq!(allow_header(&write_only), "POST, OPTIONS");
    }
}
