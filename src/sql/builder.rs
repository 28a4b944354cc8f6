//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resource
//! descriptor plus translated query options.

use crate::error::AppError;
use crate::query::{QueryOptions, SortDir};
use crate::resource::{Relation, RelationKind, Resource, ResourceRegistry};
use serde_json::Value;
use std::collections::HashMap;

const MAX_LIMIT: u32 = 1000;
const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (names only come from registered
/// resources, never from request input).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

fn column_list(resource: &Resource, alias: Option<&str>) -> String {
    resource
        .columns
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{}.{}", a, quoted(&c.name)),
            None => quoted(&c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Typed placeholder for a column: `$n::type`.
fn placeholder(resource: &Resource, column: &str, n: usize) -> String {
    match resource.column(column) {
        Some(c) => format!("${}::{}", n, c.kind.pg_type()),
        None => format!("${}", n),
    }
}

/// Scalar subquery for one preloaded relation: `row_to_json` for
/// belongs-to, `json_agg` for has-many. Fails when the relation points at
/// an unregistered resource.
fn preload_subquery(
    relation: &Relation,
    registry: &ResourceRegistry,
) -> Result<String, AppError> {
    let related = registry.by_path(&relation.related_path).ok_or_else(|| {
        AppError::BadRequest(format!("unknown resource: {}", relation.related_path))
    })?;
    let rel_cols = column_list(related, None);
    let sub_from = format!(
        "{} WHERE {} = {}.{}",
        quoted(&related.table),
        quoted(&relation.their_key),
        MAIN_ALIAS,
        quoted(&relation.our_key),
    );
    let subquery = match relation.kind {
        RelationKind::BelongsTo => format!(
            "(SELECT row_to_json(sub) FROM (SELECT {} FROM {}) sub)",
            rel_cols, sub_from
        ),
        RelationKind::HasMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {} ORDER BY {}) sub)",
            rel_cols,
            sub_from,
            quoted(&related.pk_column)
        ),
    };
    Ok(format!("{} AS {}", subquery, quoted(&relation.name)))
}

fn select_parts(
    resource: &Resource,
    opts: &QueryOptions,
    registry: &ResourceRegistry,
) -> Result<String, AppError> {
    let mut parts: Vec<String> = resource
        .columns
        .iter()
        .map(|c| format!("{}.{}", MAIN_ALIAS, quoted(&c.name)))
        .collect();
    for name in &opts.preloads {
        let relation = resource
            .relation(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown preload: {}", name)))?;
        parts.push(preload_subquery(relation, registry)?);
    }
    Ok(parts.join(", "))
}

/// SELECT one row by primary key, with any requested preloads.
pub fn select_by_id(
    resource: &Resource,
    opts: &QueryOptions,
    registry: &ResourceRegistry,
    id: &Value,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let cols = select_parts(resource, opts, registry)?;
    let n = q.push_param(id.clone());
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {}.{} = {}",
        cols,
        quoted(&resource.table),
        MAIN_ALIAS,
        MAIN_ALIAS,
        quoted(&resource.pk_column),
        placeholder(resource, &resource.pk_column, n),
    );
    Ok(q)
}

/// SELECT a list: equality filters, ORDER BY (pk when no sort given),
/// LIMIT/OFFSET, preloads as scalar subqueries.
pub fn select_list(
    resource: &Resource,
    opts: &QueryOptions,
    registry: &ResourceRegistry,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let cols = select_parts(resource, opts, registry)?;

    let mut where_parts = Vec::new();
    for (col, val) in &opts.filters {
        if resource.has_column(col) {
            let n = q.push_param(val.clone());
            where_parts.push(format!(
                "{}.{} = {}",
                MAIN_ALIAS,
                quoted(col),
                placeholder(resource, col, n)
            ));
        }
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };

    let order_clause = if opts.sort.is_empty() {
        format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(&resource.pk_column))
    } else {
        let parts: Vec<String> = opts
            .sort
            .iter()
            .map(|(col, dir)| {
                let dir = match dir {
                    SortDir::Asc => "ASC",
                    SortDir::Desc => "DESC",
                };
                format!("{}.{} {}", MAIN_ALIAS, quoted(col), dir)
            })
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };

    let limit_clause = opts
        .limit
        .map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT)))
        .unwrap_or_default();
    let offset_clause = opts
        .offset
        .map(|n| format!(" OFFSET {}", n))
        .unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        cols,
        quoted(&resource.table),
        MAIN_ALIAS,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    Ok(q)
}

/// SELECT COUNT(*) over the whole table.
pub fn count(resource: &Resource) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", quoted(&resource.table));
    q
}

/// INSERT from body. Columns with a DB default are omitted when the body
/// does not provide a value. RETURNING the full row.
pub fn insert(resource: &Resource, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &resource.columns {
        let val = body.get(&c.name).cloned();
        if val.is_none() && c.has_default {
            continue;
        }
        let n = q.push_param(val.unwrap_or(Value::Null));
        cols.push(quoted(&c.name));
        placeholders.push(format!("${}::{}", n, c.kind.pg_type()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&resource.table),
        cols.join(", "),
        placeholders.join(", "),
        column_list(resource, None),
    );
    q
}

/// UPDATE by id: SET only the columns present in body (never the pk).
/// Falls back to a plain SELECT when the body sets nothing.
pub fn update(resource: &Resource, id: &Value, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &resource.columns {
        if c.name == resource.pk_column {
            continue;
        }
        if let Some(v) = body.get(&c.name) {
            let n = q.push_param(v.clone());
            sets.push(format!("{} = ${}::{}", quoted(&c.name), n, c.kind.pg_type()));
        }
    }
    if sets.is_empty() {
        let n = q.push_param(id.clone());
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            column_list(resource, None),
            quoted(&resource.table),
            quoted(&resource.pk_column),
            placeholder(resource, &resource.pk_column, n),
        );
        return q;
    }
    let n = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table),
        sets.join(", "),
        quoted(&resource.pk_column),
        placeholder(resource, &resource.pk_column, n),
        column_list(resource, None),
    );
    q
}

/// DELETE by id, RETURNING the deleted row.
pub fn delete(resource: &Resource, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table),
        quoted(&resource.pk_column),
        placeholder(resource, &resource.pk_column, n),
        column_list(resource, None),
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::resource::FilterPolicy;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        builtin::registry()
    }

    #[test]
    fn select_list_orders_by_pk_by_default() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let q = select_list(templates, &QueryOptions::default(), &reg).unwrap();
        assert!(q.sql.contains("ORDER BY main.\"id\""));
        assert!(q.params.is_empty());
    }

    #[test]
    fn select_list_applies_filters_sort_and_pagination() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let opts = QueryOptions::from_pairs(
            templates,
            FilterPolicy::Ignore,
            [("q[name]", "base"), ("sort", "-name"), ("limit", "5"), ("offset", "2")],
        )
        .unwrap();
        let q = select_list(templates, &opts, &reg).unwrap();
        assert!(q.sql.contains("WHERE main.\"name\" = $1::text"));
        assert!(q.sql.contains("ORDER BY main.\"name\" DESC"));
        assert!(q.sql.ends_with("LIMIT 5 OFFSET 2"));
        assert_eq!(q.params, vec![json!("base")]);
    }

    #[test]
    fn preload_renders_json_agg_subquery() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let opts = QueryOptions::from_pairs(
            templates,
            FilterPolicy::Ignore,
            [("preloads", "template_arguments")],
        )
        .unwrap();
        let q = select_list(templates, &opts, &reg).unwrap();
        assert!(q.sql.contains("json_agg(row_to_json(sub))"));
        assert!(q.sql.contains("AS \"template_arguments\""));
        assert!(q.sql.contains("\"template_id\" = main.\"id\""));
    }

    #[test]
    fn belongs_to_preload_renders_row_to_json() {
        let reg = registry();
        let args = reg.by_path("template_arguments").unwrap();
        let opts = QueryOptions::from_pairs(
            args,
            FilterPolicy::Ignore,
            [("preloads", "template")],
        )
        .unwrap();
        let q = select_list(args, &opts, &reg).unwrap();
        assert!(q.sql.contains("row_to_json(sub)"));
        assert!(!q.sql.contains("json_agg"));
    }

    #[test]
    fn insert_skips_defaulted_pk_and_returns_row() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let body: HashMap<String, Value> =
            [("name".to_string(), json!("base")), ("content".to_string(), json!("hi"))]
                .into_iter()
                .collect();
        let q = insert(templates, &body);
        assert!(q.sql.starts_with("INSERT INTO \"templates\""));
        assert!(!q.sql.contains("\"id\""), "pk with default must be omitted: {}", q.sql);
        assert!(q.sql.contains("RETURNING"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_sets_only_provided_columns() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let body: HashMap<String, Value> =
            [("content".to_string(), json!("new"))].into_iter().collect();
        let q = update(templates, &json!(1), &body);
        assert!(q.sql.contains("SET \"content\" = $1::text"));
        assert!(q.sql.contains("WHERE \"id\" = $2::bigint"));
        assert_eq!(q.params, vec![json!("new"), json!(1)]);
    }

    #[test]
    fn update_with_empty_body_degrades_to_select() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let q = update(templates, &json!(1), &HashMap::new());
        assert!(q.sql.starts_with("SELECT"));
    }

    #[test]
    fn delete_returns_deleted_row() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        let q = delete(templates, &json!(9));
        assert!(q.sql.starts_with("DELETE FROM \"templates\""));
        assert!(q.sql.contains("RETURNING"));
        assert_eq!(q.params, vec![json!(9)]);
    }

    #[test]
    fn count_counts_the_whole_table() {
        let reg = registry();
        let templates = reg.by_path("templates").unwrap();
        assert_eq!(count(templates).sql, "SELECT COUNT(*) FROM \"templates\"");
    }
}
