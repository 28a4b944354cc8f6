//! Runtime resource descriptors and the ordered registry.
//!
//! A `Resource` describes one routable table: its columns, primary key, and
//! preloadable relations. Handlers, the SQL builder, and the template
//! functions all resolve resources through a `ResourceRegistry` built once at
//! startup; registration order is preserved so design export/import and the
//! root endpoint iterate deterministically.

use std::collections::HashMap;

/// Column type as seen by the query translator and the SQL builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    BigInt,
    Int,
    Float,
    Bool,
    Text,
    Timestamptz,
    Uuid,
    Json,
}

impl FieldKind {
    /// PostgreSQL type name, used for `$n::type` casts and DDL.
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldKind::BigInt => "bigint",
            FieldKind::Int => "integer",
            FieldKind::Float => "double precision",
            FieldKind::Bool => "boolean",
            FieldKind::Text => "text",
            FieldKind::Timestamptz => "timestamptz",
            FieldKind::Uuid => "uuid",
            FieldKind::Json => "jsonb",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    /// Column has a DB-side default (serial, NOW(), ...); inserts omit it
    /// when the body does not provide a value.
    pub has_default: bool,
    /// Foreign key target as (table, column). Emitted as a DEFERRABLE
    /// constraint so design import can defer checks until commit.
    pub references: Option<(String, String)>,
}

impl ColumnDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        ColumnDef {
            name: name.to_string(),
            kind,
            nullable: false,
            unique: false,
            has_default: false,
            references: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some((table.to_string(), column.to_string()));
        self
    }
}

/// Direction of a preloadable relation: `BelongsTo` (we hold the FK) or
/// `HasMany` (they hold the FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
}

/// A preloadable relation, selectable via `?preloads=name`.
#[derive(Clone, Debug)]
pub struct Relation {
    /// API name of the relation, also the response key for the nested rows.
    pub name: String,
    pub kind: RelationKind,
    /// Path of the related resource, for lookup in the registry.
    pub related_path: String,
    /// Our column used in the join.
    pub our_key: String,
    /// Their column used in the join.
    pub their_key: String,
}

/// CRUD operations a resource can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// One routable model type with generic CRUD endpoints.
#[derive(Clone, Debug)]
pub struct Resource {
    /// Resource name, used as the design snapshot key.
    pub name: String,
    pub table: String,
    /// URL path segment (usually equal to `name`).
    pub path: String,
    pub pk_column: String,
    pub pk_kind: FieldKind,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<Relation>,
    /// Operations served for this resource; requests for anything else get
    /// a bad-request response.
    pub operations: Vec<Operation>,
}

impl Resource {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// What to do with `q[field]` filters whose field is not a column of the
/// target resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Silently drop the filter (the original behavior).
    Ignore,
    /// Fail the request with a validation error.
    Reject,
}

/// Ordered collection of resources, built once at startup.
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    by_path: HashMap<String, usize>,
    pub filter_policy: FilterPolicy,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        ResourceRegistry {
            resources: Vec::new(),
            by_path: HashMap::new(),
            filter_policy: FilterPolicy::Ignore,
        }
    }

    pub fn with_filter_policy(mut self, policy: FilterPolicy) -> Self {
        self.filter_policy = policy;
        self
    }

    /// Register a resource. Later registrations with the same path replace
    /// the lookup entry but the original keeps its slot in iteration order.
    pub fn register(&mut self, resource: Resource) {
        self.by_path
            .insert(resource.path.clone(), self.resources.len());
        self.resources.push(resource);
    }

    pub fn by_path(&self, path: &str) -> Option<&Resource> {
        self.by_path.get(path).map(|i| &self.resources[*i])
    }

    /// Resources in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> Resource {
        Resource {
            name: path.to_string(),
            table: path.to_string(),
            path: path.to_string(),
            pk_column: "id".into(),
            pk_kind: FieldKind::BigInt,
            columns: vec![ColumnDef::new("id", FieldKind::BigInt).with_default()],
            relations: vec![],
            operations: Operation::ALL.to_vec(),
        }
    }

    #[test]
    fn lookup_by_path() {
        let mut reg = ResourceRegistry::new();
        reg.register(sample("templates"));
        reg.register(sample("template_arguments"));
        assert!(reg.by_path("templates").is_some());
        assert!(reg.by_path("missing").is_none());
    }

    #[test]
    fn iteration_preserves_registration_order() {
        let mut reg = ResourceRegistry::new();
        for p in ["c", "a", "b"] {
            reg.register(sample(p));
        }
        let order: Vec<&str> = reg.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
