//! Text template generation backed by the store.
//!
//! Templates and their typed arguments live in ordinary resources
//! (`templates`, `template_arguments`); generation fetches a template row
//! with its arguments preloaded, builds the scope from defaults plus
//! `p[...]` overrides, and renders the content. Store functions inside the
//! template reuse the same connection handle, so one request sees one
//! consistent snapshot.

pub mod args;
pub mod engine;
pub mod functions;
pub mod parser;

pub use args::{ArgumentType, TemplateArgumentRecord, TemplateRecord};
pub use engine::{RenderContext, Renderer};
pub use functions::{builtins, FunctionRegistry, TemplateFunction};

use crate::error::AppError;
use crate::store::ModelStore;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Maximum nesting of `include` calls before a render is aborted.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Which template to generate.
pub enum TemplateSelector<'a> {
    Id(&'a str),
    Name(&'a str),
}

fn p_param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^p\[(.+)\]$").unwrap())
}

/// Extract `p[name]=value` parameter overrides from a query string, in
/// order. Other keys are ignored.
pub fn parse_p_params(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .filter_map(|(k, v)| {
            p_param_regex()
                .captures(&k)
                .map(|c| (c[1].to_string(), v.into_owned()))
        })
        .collect()
}

/// Fetch a template row with its arguments preloaded.
pub async fn fetch_template(
    store: &mut dyn ModelStore,
    selector: &TemplateSelector<'_>,
) -> Result<TemplateRecord, AppError> {
    let row = match selector {
        TemplateSelector::Id(id) => {
            store
                .get_single("templates", id, "preloads=template_arguments")
                .await?
        }
        TemplateSelector::Name(name) => {
            let encoded: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
            let query = format!("q[name]={}&preloads=template_arguments", encoded);
            store
                .get_multi("templates", &query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| AppError::NotFound("record not found".into()))?
        }
    };
    serde_json::from_value(row)
        .map_err(|e| AppError::BadRequest(format!("malformed template row: {}", e)))
}

/// Generate a template: fetch, build the argument scope, render. The store
/// handle is shared with every store function and nested include in the
/// template.
pub async fn generate(
    store: &mut dyn ModelStore,
    funcs: &Arc<FunctionRegistry>,
    selector: &TemplateSelector<'_>,
    overrides: &[(String, String)],
) -> Result<String, AppError> {
    let record = fetch_template(store, selector).await?;
    let scope = args::build_scope(&record.template_arguments, overrides)?;
    let renderer = Renderer::parse(&record.content)?;
    let mut ctx = RenderContext {
        store,
        funcs: Arc::clone(funcs),
        depth: 0,
    };
    Ok(renderer.render(&mut ctx, &scope).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::store::mock::MockStore;
    use serde_json::json;

    #[test]
    fn p_params_are_extracted_in_order() {
        let params = parse_p_params("p[name]=Rust&other=1&p[count]=3");
        assert_eq!(
            params,
            vec![
                ("name".to_string(), "Rust".to_string()),
                ("count".to_string(), "3".to_string()),
            ]
        );
        assert!(parse_p_params("").is_empty());
        assert!(parse_p_params("q[name]=x&limit=5").is_empty());
    }

    #[test]
    fn p_params_decode_url_escapes() {
        let params = parse_p_params("p[name]=hello%20world");
        assert_eq!(params, vec![("name".to_string(), "hello world".to_string())]);
    }

    fn greeting_store() -> MockStore {
        MockStore::new(builtin::registry()).with_rows(
            "templates",
            vec![json!({
                "id": 7,
                "name": "greeting",
                "content": "Hello {{.name}}!",
                "template_arguments": [
                    {"name": "name", "type": "string", "default_value": "world"}
                ],
            })],
        )
    }

    #[tokio::test]
    async fn generate_by_id_uses_argument_defaults() {
        let mut store = greeting_store();
        let funcs = Arc::new(builtins());
        let out = generate(&mut store, &funcs, &TemplateSelector::Id("7"), &[])
            .await
            .unwrap();
        assert_eq!(out, "Hello world!");
    }

    #[tokio::test]
    async fn generate_by_name_applies_overrides() {
        let mut store = greeting_store();
        let funcs = Arc::new(builtins());
        let overrides = vec![("name".to_string(), "Rust".to_string())];
        let out = generate(
            &mut store,
            &funcs,
            &TemplateSelector::Name("greeting"),
            &overrides,
        )
        .await
        .unwrap();
        assert_eq!(out, "Hello Rust!");
    }

    #[tokio::test]
    async fn unknown_template_name_is_not_found() {
        let mut store = greeting_store();
        let funcs = Arc::new(builtins());
        let err = generate(&mut store, &funcs, &TemplateSelector::Name("nope"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn override_for_undeclared_parameter_fails() {
        let mut store = greeting_store();
        let funcs = Arc::new(builtins());
        let overrides = vec![("bogus".to_string(), "x".to_string())];
        let err = generate(
            &mut store,
            &funcs,
            &TemplateSelector::Name("greeting"),
            &overrides,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
