//! Design snapshot: export and import the whole store as one JSON document
//! keyed by accessor key.
//!
//! Import replaces everything: within the caller's transaction all foreign
//! key checks are deferred to commit, every accessor is cleared, then rows
//! are loaded in registration order. A failed import rolls back with the
//! transaction and leaves the store untouched.

use crate::error::AppError;
use crate::query::QueryOptions;
use crate::resource::{FieldKind, Resource, ResourceRegistry};
use crate::service::CrudService;
use crate::sql::builder::quoted;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry in the snapshot document: how to export, clear, and reload its
/// rows.
#[async_trait]
pub trait DesignAccessor: Send + Sync {
    /// Key of this accessor's rows in the snapshot document.
    fn key(&self) -> &str;

    async fn export(&self, conn: &mut PgConnection) -> Result<Vec<Value>, AppError>;

    async fn clear(&self, conn: &mut PgConnection) -> Result<(), AppError>;

    async fn load(&self, conn: &mut PgConnection, rows: &[Value]) -> Result<(), AppError>;
}

/// Generic accessor for any registered resource: select-all, delete-all,
/// insert-each.
pub struct ResourceAccessor {
    resource: Resource,
    registry: Arc<ResourceRegistry>,
}

impl ResourceAccessor {
    pub fn new(resource: Resource, registry: Arc<ResourceRegistry>) -> Self {
        ResourceAccessor { resource, registry }
    }
}

#[async_trait]
impl DesignAccessor for ResourceAccessor {
    fn key(&self) -> &str {
        &self.resource.name
    }

    async fn export(&self, conn: &mut PgConnection) -> Result<Vec<Value>, AppError> {
        CrudService::list(conn, &self.registry, &self.resource, &QueryOptions::default()).await
    }

    async fn clear(&self, conn: &mut PgConnection) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {}", quoted(&self.resource.table));
        tracing::debug!(sql = %sql, "clear");
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    async fn load(&self, conn: &mut PgConnection, rows: &[Value]) -> Result<(), AppError> {
        for row in rows {
            let Value::Object(obj) = row else {
                continue;
            };
            let body: HashMap<String, Value> =
                obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            CrudService::create(&mut *conn, &self.resource, &body).await?;
        }
        // Rows arrive with explicit ids, which leaves a serial sequence
        // behind the data. Bump it past the current maximum.
        let serial_pk = self
            .resource
            .column(&self.resource.pk_column)
            .map(|c| c.has_default && matches!(c.kind, FieldKind::Int | FieldKind::BigInt))
            .unwrap_or(false);
        if serial_pk {
            let sql = format!(
                "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
                self.resource.table,
                self.resource.pk_column,
                quoted(&self.resource.pk_column),
                quoted(&self.resource.table),
            );
            sqlx::query(&sql).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

/// Accessors in registration order. Export and load follow that order;
/// clearing runs in reverse so children go before parents.
pub struct AccessorRegistry {
    accessors: Vec<Box<dyn DesignAccessor>>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        AccessorRegistry {
            accessors: Vec::new(),
        }
    }

    pub fn register(&mut self, accessor: Box<dyn DesignAccessor>) {
        self.accessors.push(accessor);
    }

    /// A generic accessor per registered resource, in registry order.
    pub fn generic(registry: &Arc<ResourceRegistry>) -> Self {
        let mut out = Self::new();
        for resource in registry.iter() {
            out.register(Box::new(ResourceAccessor::new(
                resource.clone(),
                Arc::clone(registry),
            )));
        }
        out
    }

    pub async fn export(&self, conn: &mut PgConnection) -> Result<Value, AppError> {
        let mut design = Map::new();
        for accessor in &self.accessors {
            let rows = accessor.export(&mut *conn).await?;
            design.insert(accessor.key().to_string(), Value::Array(rows));
        }
        Ok(Value::Object(design))
    }

    pub async fn clear_all(&self, conn: &mut PgConnection) -> Result<(), AppError> {
        for accessor in self.accessors.iter().rev() {
            accessor.clear(&mut *conn).await?;
        }
        Ok(())
    }

    /// Replace the whole store with `design`. Must run inside a transaction;
    /// constraint checks are deferred so rows can arrive in any order within
    /// an accessor.
    pub async fn import(&self, conn: &mut PgConnection, design: &Value) -> Result<(), AppError> {
        let models = self.check_shape(design)?;
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *conn)
            .await?;
        self.clear_all(conn).await?;
        for accessor in &self.accessors {
            if let Some(Value::Array(rows)) = models.get(accessor.key()) {
                accessor.load(&mut *conn, rows).await?;
            }
        }
        Ok(())
    }

    /// Validate the snapshot shape: an object whose keys are accessor keys
    /// mapping to lists of row objects.
    fn check_shape<'a>(&self, design: &'a Value) -> Result<&'a Map<String, Value>, AppError> {
        let Value::Object(models) = design else {
            return Err(AppError::Validation(
                "design must be an object keyed by resource name".into(),
            ));
        };
        for (key, rows) in models {
            if !self.accessors.iter().any(|a| a.key() == key) {
                return Err(AppError::Validation(format!(
                    "unknown resource in design: {}",
                    key
                )));
            }
            let Value::Array(rows) = rows else {
                return Err(AppError::Validation(format!(
                    "design entry {} must be a list of rows",
                    key
                )));
            };
            if rows.iter().any(|r| !r.is_object()) {
                return Err(AppError::Validation(format!(
                    "design entry {} must contain only row objects",
                    key
                )));
            }
        }
        Ok(models)
    }
}

impl Default for AccessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use serde_json::json;

    fn accessors() -> AccessorRegistry {
        AccessorRegistry::generic(&Arc::new(builtin::registry()))
    }

    #[test]
    fn accessor_keys_follow_registration_order() {
        let reg = accessors();
        let keys: Vec<&str> = reg.accessors.iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["templates", "template_arguments"]);
    }

    #[test]
    fn shape_check_accepts_known_resources() {
        let design = json!({
            "templates": [{"id": 1, "name": "a", "content": "x"}],
            "template_arguments": [],
        });
        assert!(accessors().check_shape(&design).is_ok());
    }

    #[test]
    fn shape_check_rejects_unknown_resource() {
        let err = accessors()
            .check_shape(&json!({"widgets": []}))
            .unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn shape_check_rejects_non_list_entries() {
        let reg = accessors();
        assert!(reg.check_shape(&json!({"templates": {}})).is_err());
        assert!(reg.check_shape(&json!({"templates": [1, 2]})).is_err());
        assert!(reg.check_shape(&json!([])).is_err());
    }
}
