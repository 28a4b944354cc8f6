//! Built-in resources: templates and their typed arguments.

use crate::resource::{
    ColumnDef, FieldKind, Operation, Relation, RelationKind, Resource, ResourceRegistry,
};

pub fn template_resource() -> Resource {
    Resource {
        name: "templates".into(),
        table: "templates".into(),
        path: "templates".into(),
        pk_column: "id".into(),
        pk_kind: FieldKind::BigInt,
        columns: vec![
            ColumnDef::new("id", FieldKind::BigInt).with_default(),
            ColumnDef::new("name", FieldKind::Text).unique(),
            ColumnDef::new("content", FieldKind::Text),
        ],
        relations: vec![Relation {
            name: "template_arguments".into(),
            kind: RelationKind::HasMany,
            related_path: "template_arguments".into(),
            our_key: "id".into(),
            their_key: "template_id".into(),
        }],
        operations: Operation::ALL.to_vec(),
    }
}

pub fn template_argument_resource() -> Resource {
    Resource {
        name: "template_arguments".into(),
        table: "template_arguments".into(),
        path: "template_arguments".into(),
        pk_column: "id".into(),
        pk_kind: FieldKind::BigInt,
        columns: vec![
            ColumnDef::new("id", FieldKind::BigInt).with_default(),
            ColumnDef::new("template_id", FieldKind::BigInt).references("templates", "id"),
            ColumnDef::new("name", FieldKind::Text),
            ColumnDef::new("type", FieldKind::Text),
            ColumnDef::new("default_value", FieldKind::Text),
        ],
        relations: vec![Relation {
            name: "template".into(),
            kind: RelationKind::BelongsTo,
            related_path: "templates".into(),
            our_key: "template_id".into(),
            their_key: "id".into(),
        }],
        operations: Operation::ALL.to_vec(),
    }
}

/// Registry with the built-in resources, in dependency order (templates
/// before their arguments, so design import loads parents first).
pub fn registry() -> ResourceRegistry {
    let mut reg = ResourceRegistry::new();
    reg.register(template_resource());
    reg.register(template_argument_resource());
    reg
}
