//! Query parameter translation: `q[field]=value` filters, `sort`,
//! `limit`/`offset`, `preloads`, `fields`, `stream`, `pretty`.
//!
//! Parsed once per request (or per template function call) into
//! `QueryOptions`, which the SQL builder applies as composable query
//! modifications.

use crate::error::AppError;
use crate::projection::{parse_fields, FieldTree};
use crate::resource::{FieldKind, FilterPolicy, Resource};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn filter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^q\[(.+)\]$").unwrap())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Store query modifications derived from request query parameters.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Equality filters, in parameter order. Values are parsed to the
    /// column's kind where possible.
    pub filters: Vec<(String, Value)>,
    pub sort: Vec<(String, SortDir)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub preloads: Vec<String>,
    pub fields: FieldTree,
    pub stream: bool,
    pub pretty: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            filters: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
            preloads: Vec::new(),
            fields: parse_fields("*"),
            stream: false,
            pretty: false,
        }
    }
}

impl QueryOptions {
    /// Parse from decoded key/value pairs against a target resource.
    /// Unknown filter columns follow `policy`; unknown sort fields and
    /// preload names are always rejected.
    pub fn from_pairs<'a, I>(
        resource: &Resource,
        policy: FilterPolicy,
        pairs: I,
    ) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = QueryOptions::default();
        for (key, value) in pairs {
            match key {
                "limit" => {
                    opts.limit = Some(value.parse().map_err(|_| {
                        AppError::BadRequest(format!("invalid limit: {}", value))
                    })?);
                }
                "offset" => {
                    opts.offset = Some(value.parse().map_err(|_| {
                        AppError::BadRequest(format!("invalid offset: {}", value))
                    })?);
                }
                "sort" => {
                    opts.sort = parse_sort(resource, value)?;
                }
                "preloads" => {
                    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        if resource.relation(name).is_none() {
                            return Err(AppError::BadRequest(format!(
                                "unknown preload: {}",
                                name
                            )));
                        }
                        opts.preloads.push(name.to_string());
                    }
                }
                "fields" => {
                    opts.fields = parse_fields(value);
                }
                "stream" => {
                    opts.stream = true;
                }
                "pretty" => {
                    opts.pretty = true;
                }
                _ => {
                    if let Some(caps) = filter_regex().captures(key) {
                        let column = caps.get(1).unwrap().as_str();
                        match resource.column(column) {
                            Some(col) => {
                                opts.filters
                                    .push((column.to_string(), parse_filter_value(col.kind, value)));
                            }
                            None => {
                                if policy == FilterPolicy::Reject {
                                    return Err(AppError::Validation(format!(
                                        "unknown filter key: {}",
                                        column
                                    )));
                                }
                            }
                        }
                    }
                    // Anything else is not ours to interpret.
                }
            }
        }
        Ok(opts)
    }

    /// Parse from a raw query string (template functions receive these).
    pub fn from_query_str(
        resource: &Resource,
        policy: FilterPolicy,
        query: &str,
    ) -> Result<Self, AppError> {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self::from_pairs(
            resource,
            policy,
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}

/// `sort=name,-id` or `sort=name,desc`: comma-separated fields, `-` prefix
/// or a following `asc`/`desc` token sets direction, ascending by default.
fn parse_sort(resource: &Resource, spec: &str) -> Result<Vec<(String, SortDir)>, AppError> {
    let mut sort: Vec<(String, SortDir)> = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match token {
            "asc" | "desc" => {
                let dir = if token == "asc" { SortDir::Asc } else { SortDir::Desc };
                match sort.last_mut() {
                    Some(last) => last.1 = dir,
                    None => {
                        return Err(AppError::BadRequest(
                            "sort direction without a field".into(),
                        ))
                    }
                }
            }
            _ => {
                let (field, dir) = match token.strip_prefix('-') {
                    Some(f) => (f, SortDir::Desc),
                    None => (token, SortDir::Asc),
                };
                if !resource.has_column(field) {
                    return Err(AppError::BadRequest(format!(
                        "unknown sort field: {}",
                        field
                    )));
                }
                sort.push((field.to_string(), dir));
            }
        }
    }
    Ok(sort)
}

/// Best-effort parse of a filter value to the column's kind; falls back to
/// the raw string and lets the `$n::type` cast decide.
fn parse_filter_value(kind: FieldKind, s: &str) -> Value {
    match kind {
        FieldKind::Int | FieldKind::BigInt => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(s.to_string())),
        FieldKind::Float => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(s.to_string())),
        FieldKind::Bool => match s {
            _ if s.eq_ignore_ascii_case("true") || s == "1" => Value::Bool(true),
            _ if s.eq_ignore_ascii_case("false") || s == "0" => Value::Bool(false),
            _ => Value::String(s.to_string()),
        },
        _ => Value::String(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ColumnDef, Operation, Relation, RelationKind};
    use serde_json::json;

    fn resource() -> Resource {
        Resource {
            name: "templates".into(),
            table: "templates".into(),
            path: "templates".into(),
            pk_column: "id".into(),
            pk_kind: FieldKind::BigInt,
            columns: vec![
                ColumnDef::new("id", FieldKind::BigInt).with_default(),
                ColumnDef::new("name", FieldKind::Text),
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

    fn parse(pairs: &[(&str, &str)]) -> Result<QueryOptions, AppError> {
        QueryOptions::from_pairs(&resource(), FilterPolicy::Ignore, pairs.iter().copied())
    }

    #[test]
    fn filters_parse_to_column_kind() {
        let opts = parse(&[("q[id]", "7"), ("q[name]", "base")]).unwrap();
        assert_eq!(
            opts.filters,
            vec![("id".into(), json!(7)), ("name".into(), json!("base"))]
        );
    }

    #[test]
    fn unknown_filter_key_is_ignored_by_default() {
        let opts = parse(&[("q[bogus]", "x")]).unwrap();
        assert!(opts.filters.is_empty());
    }

    #[test]
    fn unknown_filter_key_is_rejected_under_reject_policy() {
        let err = QueryOptions::from_pairs(
            &resource(),
            FilterPolicy::Reject,
            [("q[bogus]", "x")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn sort_defaults_ascending() {
        let opts = parse(&[("sort", "name")]).unwrap();
        assert_eq!(opts.sort, vec![("name".into(), SortDir::Asc)]);
    }

    #[test]
    fn sort_accepts_prefix_and_token_forms() {
        let opts = parse(&[("sort", "name,-id")]).unwrap();
        assert_eq!(
            opts.sort,
            vec![("name".into(), SortDir::Asc), ("id".into(), SortDir::Desc)]
        );
        let opts = parse(&[("sort", "name,desc")]).unwrap();
        assert_eq!(opts.sort, vec![("name".into(), SortDir::Desc)]);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        assert!(parse(&[("sort", "bogus")]).is_err());
    }

    #[test]
    fn preloads_must_name_known_relations() {
        let opts = parse(&[("preloads", "template_arguments")]).unwrap();
        assert_eq!(opts.preloads, vec!["template_arguments".to_string()]);
        assert!(parse(&[("preloads", "bogus")]).is_err());
    }

    #[test]
    fn pagination_and_emission_flags() {
        let opts = parse(&[
            ("limit", "10"),
            ("offset", "20"),
            ("stream", ""),
            ("pretty", ""),
        ])
        .unwrap();
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.offset, Some(20));
        assert!(opts.stream);
        assert!(opts.pretty);
        assert!(parse(&[("limit", "abc")]).is_err());
    }

    #[test]
    fn from_query_str_decodes_brackets() {
        let opts =
            QueryOptions::from_query_str(&resource(), FilterPolicy::Ignore, "q%5Bname%5D=base&sort=-id")
                .unwrap();
        assert_eq!(opts.filters, vec![("name".into(), json!("base"))]);
        assert_eq!(opts.sort, vec![("id".into(), SortDir::Desc)]);
    }
}
