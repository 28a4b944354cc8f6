//! Generic CRUD execution against PostgreSQL.
//!
//! Every function takes `&mut PgConnection` so the caller decides the
//! transaction scope; nested template lookups reuse the same handle instead
//! of re-acquiring one from the pool.

use crate::error::AppError;
use crate::query::QueryOptions;
use crate::resource::{FieldKind, Resource, ResourceRegistry};
use crate::sql::{self, PgBindValue, QueryBuf};
use serde_json::Value;
use sqlx::PgConnection;
use std::collections::HashMap;

/// Parse a path id segment to the resource's primary key kind.
pub fn parse_id(resource: &Resource, id: &str) -> Result<Value, AppError> {
    match resource.pk_kind {
        FieldKind::Int | FieldKind::BigInt => {
            let n: i64 = id
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid id: {}", id)))?;
            Ok(Value::Number(n.into()))
        }
        FieldKind::Uuid => {
            let u = uuid::Uuid::parse_str(id)
                .map_err(|_| AppError::BadRequest(format!("invalid uuid: {}", id)))?;
            Ok(Value::String(u.to_string()))
        }
        _ => Ok(Value::String(id.to_string())),
    }
}

/// Reject body keys that are not columns of the resource.
fn check_body_columns(resource: &Resource, body: &HashMap<String, Value>) -> Result<(), AppError> {
    for key in body.keys() {
        if !resource.has_column(key) {
            return Err(AppError::Validation(format!(
                "unknown field: {}",
                key
            )));
        }
    }
    Ok(())
}

pub struct CrudService;

impl CrudService {
    /// List rows with filters, sort, pagination, and preloads applied.
    pub async fn list(
        conn: &mut PgConnection,
        registry: &ResourceRegistry,
        resource: &Resource,
        opts: &QueryOptions,
    ) -> Result<Vec<Value>, AppError> {
        let q = sql::select_list(resource, opts, registry)?;
        Self::query_many(conn, &q).await
    }

    /// Fetch one row by primary key, with preloads.
    pub async fn get(
        conn: &mut PgConnection,
        registry: &ResourceRegistry,
        resource: &Resource,
        opts: &QueryOptions,
        id: &Value,
    ) -> Result<Option<Value>, AppError> {
        let q = sql::select_by_id(resource, opts, registry, id)?;
        Self::query_optional(conn, &q).await
    }

    /// Insert one row. Returns the created row.
    pub async fn create(
        conn: &mut PgConnection,
        resource: &Resource,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        check_body_columns(resource, body)?;
        let q = sql::insert(resource, body);
        Self::query_optional(conn, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Update one row by id, setting only the provided columns. Returns the
    /// updated row, or None when the id does not exist.
    pub async fn update(
        conn: &mut PgConnection,
        resource: &Resource,
        id: &Value,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        check_body_columns(resource, body)?;
        let q = sql::update(resource, id, body);
        Self::query_optional(conn, &q).await
    }

    /// Delete one row by id. Returns the deleted row, or None.
    pub async fn delete(
        conn: &mut PgConnection,
        resource: &Resource,
        id: &Value,
    ) -> Result<Option<Value>, AppError> {
        let q = sql::delete(resource, id);
        Self::query_optional(conn, &q).await
    }

    /// Total row count of the resource's table.
    pub async fn count(conn: &mut PgConnection, resource: &Resource) -> Result<i64, AppError> {
        let q = sql::count(resource);
        tracing::debug!(sql = %q.sql, "query");
        let n: (i64,) = sqlx::query_as(&q.sql).fetch_one(conn).await?;
        Ok(n.0)
    }

    async fn query_many(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(conn).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(conn).await?;
        Ok(row.as_ref().map(row_to_json))
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
