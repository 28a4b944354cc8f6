//! Field projection: reduce a full row to a caller-selected subset of keys.
//!
//! `fields=name,template_arguments.name` selects the `name` column plus the
//! `name` key of each preloaded `template_arguments` row. `*` selects
//! everything at its level. Requesting a key the row does not have is a
//! validation error.

use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parsed `fields` parameter: a tree of selected keys. `wildcard` keeps all
/// keys at that level; `children` narrows nested objects further.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTree {
    pub wildcard: bool,
    pub children: BTreeMap<String, FieldTree>,
}

impl FieldTree {
    /// True when the tree selects everything (`*` or empty).
    pub fn is_all(&self) -> bool {
        self.wildcard && self.children.is_empty()
    }
}

/// Parse a comma-separated field list with dotted nesting.
/// `"name,template_arguments.name"` or `"*"`.
pub fn parse_fields(spec: &str) -> FieldTree {
    let mut root = FieldTree::default();
    for item in spec.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut node = &mut root;
        for segment in item.split('.') {
            if segment == "*" {
                node.wildcard = true;
                break;
            }
            node = node.children.entry(segment.to_string()).or_default();
        }
    }
    if root.children.is_empty() {
        root.wildcard = true;
    }
    root
}

/// Project one row. Arrays are projected element-wise so preloaded relation
/// lists keep their shape.
pub fn project(value: &Value, tree: &FieldTree) -> Result<Value, AppError> {
    if tree.is_all() {
        return Ok(value.clone());
    }
    match value {
        Value::Object(map) => project_object(map, tree),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(project(item, tree)?);
            }
            Ok(Value::Array(out))
        }
        // A leaf with remaining selectors: the requested fields cannot exist.
        _ => match tree.children.keys().next() {
            Some(key) => Err(AppError::BadRequest(format!(
                "field {} does not exist",
                key
            ))),
            None => Ok(value.clone()),
        },
    }
}

fn project_object(map: &Map<String, Value>, tree: &FieldTree) -> Result<Value, AppError> {
    let mut out = Map::new();
    if tree.wildcard {
        for (k, v) in map {
            out.insert(k.clone(), v.clone());
        }
    }
    for (key, subtree) in &tree.children {
        let Some(v) = map.get(key) else {
            return Err(AppError::BadRequest(format!("field {} does not exist", key)));
        };
        let projected = if subtree.children.is_empty() {
            v.clone()
        } else {
            project(v, subtree)?
        };
        out.insert(key.clone(), projected);
    }
    Ok(Value::Object(out))
}

/// Project every row of a result set.
pub fn project_many(rows: &[Value], tree: &FieldTree) -> Result<Vec<Value>, AppError> {
    if tree.is_all() {
        return Ok(rows.to_vec());
    }
    rows.iter().map(|r| project(r, tree)).collect()
}
