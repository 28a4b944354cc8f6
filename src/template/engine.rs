//! Template evaluation.
//!
//! Rendering is synchronous per request but the store functions it can call
//! are async, so node/expression evaluation is written as boxed recursive
//! futures. The `RenderContext` carries the one store handle the whole
//! render (and every nested include) shares.

use crate::error::TemplateError;
use crate::store::ModelStore;
use crate::template::functions::FunctionRegistry;
use crate::template::parser::{parse, Expr, Node};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// State threaded through one render: the store handle, the function
/// registry, and the current include depth.
pub struct RenderContext<'a> {
    pub store: &'a mut dyn ModelStore,
    pub funcs: Arc<FunctionRegistry>,
    pub depth: usize,
}

type EvalFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, TemplateError>> + Send + 'a>>;

/// A parsed template ready to render.
pub struct Renderer {
    nodes: Vec<Node>,
}

impl Renderer {
    pub fn parse(content: &str) -> Result<Self, TemplateError> {
        Ok(Renderer {
            nodes: parse(content)?,
        })
    }

    pub async fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        scope: &Value,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, scope, &mut out).await?;
        Ok(out)
    }
}

fn render_nodes<'a, 'b>(
    nodes: &'a [Node],
    ctx: &'a mut RenderContext<'b>,
    scope: &'a Value,
    out: &'a mut String,
) -> EvalFut<'a, ()>
where
    'b: 'a,
{
    Box::pin(async move {
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Action(expr) => {
                    let v = eval_expr(expr, ctx, scope).await?;
                    out.push_str(&value_to_display(&v));
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let v = eval_expr(cond, ctx, scope).await?;
                    let branch = if truthy(&v) { then } else { otherwise };
                    render_nodes(branch, ctx, scope, out).await?;
                }
                Node::Range { expr, body } => {
                    let v = eval_expr(expr, ctx, scope).await?;
                    let items = match v {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        other => {
                            return Err(TemplateError::Eval(format!(
                                "range over non-list value: {}",
                                value_to_display(&other)
                            )))
                        }
                    };
                    for item in &items {
                        render_nodes(body, ctx, item, out).await?;
                    }
                }
            }
        }
        Ok(())
    })
}

pub(crate) fn eval_expr<'a, 'b>(
    expr: &'a Expr,
    ctx: &'a mut RenderContext<'b>,
    scope: &'a Value,
) -> EvalFut<'a, Value>
where
    'b: 'a,
{
    Box::pin(async move {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(path) => {
                let mut current = scope;
                for segment in path {
                    current = current
                        .get(segment)
                        .ok_or_else(|| TemplateError::UndefinedVariable(path.join(".")))?;
                }
                Ok(current.clone())
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval_expr(arg, ctx, scope).await?);
                }
                let func = ctx
                    .funcs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::UnknownFunction(name.clone()))?;
                func.call(ctx, values).await
            }
        }
    })
}

/// Truthiness for `{{if}}`: null, false, zero, empty string/list/object are
/// false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text rendering of an evaluated value: strings verbatim, scalars via
/// display, composites as compact JSON.
pub fn value_to_display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::store::mock::MockStore;
    use crate::template::functions;
    use serde_json::json;

    async fn render(content: &str, scope: Value) -> Result<String, TemplateError> {
        let mut store = MockStore::new(builtin::registry());
        let mut ctx = RenderContext {
            store: &mut store,
            funcs: Arc::new(functions::builtins()),
            depth: 0,
        };
        Renderer::parse(content)?.render(&mut ctx, &scope).await
    }

    #[tokio::test]
    async fn renders_scope_variables() {
        let out = render("Hello {{.name}}", json!({"name": "world"}))
            .await
            .unwrap();
        assert_eq!(out, "Hello world");
    }

    #[tokio::test]
    async fn undefined_variable_aborts_the_render() {
        let err = render("Hello {{.missing}}", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn if_follows_truthiness() {
        let tpl = "{{if .on}}yes{{else}}no{{end}}";
        assert_eq!(render(tpl, json!({"on": true})).await.unwrap(), "yes");
        assert_eq!(render(tpl, json!({"on": 0})).await.unwrap(), "no");
        assert_eq!(render(tpl, json!({"on": ""})).await.unwrap(), "no");
        assert_eq!(render(tpl, json!({"on": [1]})).await.unwrap(), "yes");
    }

    #[tokio::test]
    async fn range_rebinds_dot_to_each_element() {
        let tpl = "{{range .items}}[{{.name}}]{{end}}";
        let out = render(tpl, json!({"items": [{"name": "a"}, {"name": "b"}]}))
            .await
            .unwrap();
        assert_eq!(out, "[a][b]");
    }

    #[tokio::test]
    async fn range_over_scalar_fails() {
        assert!(render("{{range .x}}{{end}}", json!({"x": 3})).await.is_err());
    }

    #[tokio::test]
    async fn unknown_function_is_reported_by_name() {
        let err = render("{{frobnicate 1}}", json!({})).await.unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction(ref n) if n == "frobnicate"));
    }

    #[tokio::test]
    async fn nested_call_arguments_evaluate_inside_out() {
        let out = render("{{add 1 (mul .n 3)}}", json!({"n": 2})).await.unwrap();
        assert_eq!(out, "7");
    }
}
