//! Store handle abstraction and database bootstrap.
//!
//! `ModelStore` is the seam the template functions re-enter the CRUD
//! pipeline through: one transaction-scoped handle is passed through every
//! nested lookup, never re-acquired implicitly.

use crate::error::AppError;
use crate::projection;
use crate::query::QueryOptions;
use crate::resource::ResourceRegistry;
use crate::service::{parse_id, CrudService};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{ConnectOptions, PgConnection, PgPool};
use std::str::FromStr;

/// Resolves a logical resource path plus a query string to projected rows.
/// Implemented over a live transaction in production, and by an in-memory
/// fixture in tests.
#[async_trait]
pub trait ModelStore: Send {
    /// One row by id, query translated and projection applied.
    async fn get_single(&mut self, path: &str, id: &str, query: &str) -> Result<Value, AppError>;

    /// All matching rows, query translated and projection applied.
    async fn get_multi(&mut self, path: &str, query: &str) -> Result<Vec<Value>, AppError>;

    /// Total row count for the resource.
    async fn total(&mut self, path: &str) -> Result<i64, AppError>;
}

/// Production store: a borrowed transaction connection plus the registry.
pub struct SqlStore<'a> {
    conn: &'a mut PgConnection,
    registry: &'a ResourceRegistry,
}

impl<'a> SqlStore<'a> {
    pub fn new(conn: &'a mut PgConnection, registry: &'a ResourceRegistry) -> Self {
        SqlStore { conn, registry }
    }
}

#[async_trait]
impl ModelStore for SqlStore<'_> {
    async fn get_single(&mut self, path: &str, id: &str, query: &str) -> Result<Value, AppError> {
        let resource = self
            .registry
            .by_path(path)
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        let opts = QueryOptions::from_query_str(resource, self.registry.filter_policy, query)?;
        let id = parse_id(resource, id)?;
        let row = CrudService::get(self.conn, self.registry, resource, &opts, &id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}/{}", path, id)))?;
        projection::project(&row, &opts.fields)
    }

    async fn get_multi(&mut self, path: &str, query: &str) -> Result<Vec<Value>, AppError> {
        let resource = self
            .registry
            .by_path(path)
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        let opts = QueryOptions::from_query_str(resource, self.registry.filter_policy, query)?;
        let rows = CrudService::list(self.conn, self.registry, resource, &opts).await?;
        projection::project_many(&rows, &opts.fields)
    }

    async fn total(&mut self, path: &str) -> Result<i64, AppError> {
        let resource = self
            .registry
            .by_path(path)
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        CrudService::count(self.conn, resource).await
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects
/// to the default `postgres` database to run CREATE DATABASE. Call before
/// creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, AppError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}
