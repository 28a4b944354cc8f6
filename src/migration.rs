//! Schema creation from resource descriptors.
//!
//! Foreign keys are emitted DEFERRABLE so design import can defer every
//! constraint check to commit time.

use crate::error::AppError;
use crate::resource::{ColumnDef, FieldKind, Resource, ResourceRegistry};
use crate::sql::builder::quoted;
use sqlx::PgConnection;

/// Create the tables for every registered resource, in registration order
/// (parents before children so the foreign keys resolve).
pub async fn run(conn: &mut PgConnection, registry: &ResourceRegistry) -> Result<(), AppError> {
    for resource in registry.iter() {
        let sql = create_table_sql(resource);
        tracing::debug!(sql = %sql, "migrate");
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

pub fn create_table_sql(resource: &Resource) -> String {
    let mut parts: Vec<String> = resource
        .columns
        .iter()
        .map(|c| column_sql(resource, c))
        .collect();
    parts.push(format!("PRIMARY KEY ({})", quoted(&resource.pk_column)));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(&resource.table),
        parts.join(", ")
    )
}

fn column_sql(resource: &Resource, col: &ColumnDef) -> String {
    let is_serial_pk = col.name == resource.pk_column
        && col.has_default
        && matches!(col.kind, FieldKind::Int | FieldKind::BigInt);
    let type_name = if is_serial_pk {
        match col.kind {
            FieldKind::Int => "serial",
            _ => "bigserial",
        }
    } else {
        col.kind.pg_type()
    };
    let mut sql = format!("{} {}", quoted(&col.name), type_name);
    if !col.nullable && col.name != resource.pk_column {
        sql.push_str(" NOT NULL");
    }
    if col.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some((table, column)) = &col.references {
        sql.push_str(&format!(
            " REFERENCES {} ({}) ON DELETE CASCADE DEFERRABLE INITIALLY IMMEDIATE",
            quoted(table),
            quoted(column)
        ));
    }
    sql
}
