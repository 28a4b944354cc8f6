//! Built-in template functions.
//!
//! Pure helpers (arithmetic, conversion, string/list utilities) plus the
//! store functions `single`, `multi`, `first`, `total`, and `include` which
//! re-enter the read pipeline through the context's store handle.

use crate::error::TemplateError;
use crate::template::args::build_scope;
use crate::template::engine::{value_to_display, RenderContext, Renderer};
use crate::template::{fetch_template, parse_p_params, TemplateSelector, MAX_INCLUDE_DEPTH};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A callable exposed to templates. Store functions use the context's
/// connection handle; pure functions ignore it.
#[async_trait]
pub trait TemplateFunction: Send + Sync {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError>;
}

/// Named functions in registration order.
pub struct FunctionRegistry {
    entries: Vec<(String, Arc<dyn TemplateFunction>)>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &str, func: Arc<dyn TemplateFunction>) {
        self.entries.push((name.to_string(), func));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TemplateFunction>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard function set.
pub fn builtins() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();
    reg.register("add", Arc::new(PureFn(fn_add)));
    reg.register("sub", Arc::new(PureFn(fn_sub)));
    reg.register("mul", Arc::new(PureFn(fn_mul)));
    reg.register("div", Arc::new(PureFn(fn_div)));
    reg.register("mod", Arc::new(PureFn(fn_mod)));
    reg.register("int", Arc::new(PureFn(fn_int)));
    reg.register("float", Arc::new(PureFn(fn_float)));
    reg.register("boolean", Arc::new(PureFn(fn_boolean)));
    reg.register("string", Arc::new(PureFn(fn_string)));
    reg.register("split", Arc::new(PureFn(fn_split)));
    reg.register("join", Arc::new(PureFn(fn_join)));
    reg.register("sequence", Arc::new(PureFn(fn_sequence)));
    reg.register("single", Arc::new(SingleFn));
    reg.register("multi", Arc::new(MultiFn));
    reg.register("first", Arc::new(FirstFn));
    reg.register("total", Arc::new(TotalFn));
    reg.register("include", Arc::new(IncludeFn));
    reg
}

/// Adapter for functions that never touch the store.
struct PureFn(fn(&[Value]) -> Result<Value, TemplateError>);

#[async_trait]
impl TemplateFunction for PureFn {
    async fn call(
        &self,
        _ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        (self.0)(&args)
    }
}

fn to_i64(v: &Value) -> Result<i64, TemplateError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| TemplateError::Eval(format!("not an integer: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TemplateError::Eval(format!("not an integer: {}", s))),
        other => Err(TemplateError::Eval(format!(
            "not an integer: {}",
            value_to_display(other)
        ))),
    }
}

fn to_f64(v: &Value) -> Result<f64, TemplateError> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TemplateError::Eval(format!("not a number: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TemplateError::Eval(format!("not a number: {}", s))),
        other => Err(TemplateError::Eval(format!(
            "not a number: {}",
            value_to_display(other)
        ))),
    }
}

fn int_pair(name: &str, args: &[Value]) -> Result<(i64, i64), TemplateError> {
    if args.len() != 2 {
        return Err(TemplateError::Eval(format!(
            "{} takes exactly two arguments",
            name
        )));
    }
    Ok((to_i64(&args[0])?, to_i64(&args[1])?))
}

fn one_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, TemplateError> {
    match args {
        [v] => Ok(v),
        _ => Err(TemplateError::Eval(format!(
            "{} takes exactly one argument",
            name
        ))),
    }
}

fn string_arg(name: &str, args: &[Value], idx: usize) -> Result<String, TemplateError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(TemplateError::Eval(format!(
            "{}: argument {} must be a string, got {}",
            name,
            idx + 1,
            value_to_display(other)
        ))),
        None => Err(TemplateError::Eval(format!(
            "{}: missing argument {}",
            name,
            idx + 1
        ))),
    }
}

fn opt_string_arg(name: &str, args: &[Value], idx: usize) -> Result<String, TemplateError> {
    if args.len() <= idx {
        return Ok(String::new());
    }
    string_arg(name, args, idx)
}

fn fn_add(args: &[Value]) -> Result<Value, TemplateError> {
    let (a, b) = int_pair("add", args)?;
    Ok(Value::Number((a + b).into()))
}

fn fn_sub(args: &[Value]) -> Result<Value, TemplateError> {
    let (a, b) = int_pair("sub", args)?;
    Ok(Value::Number((a - b).into()))
}

fn fn_mul(args: &[Value]) -> Result<Value, TemplateError> {
    let (a, b) = int_pair("mul", args)?;
    Ok(Value::Number((a * b).into()))
}

fn fn_div(args: &[Value]) -> Result<Value, TemplateError> {
    let (a, b) = int_pair("div", args)?;
    if b == 0 {
        return Err(TemplateError::Eval("division by zero".into()));
    }
    Ok(Value::Number((a / b).into()))
}

fn fn_mod(args: &[Value]) -> Result<Value, TemplateError> {
    let (a, b) = int_pair("mod", args)?;
    if b == 0 {
        return Err(TemplateError::Eval("division by zero".into()));
    }
    Ok(Value::Number((a % b).into()))
}

fn fn_int(args: &[Value]) -> Result<Value, TemplateError> {
    let v = one_arg("int", args)?;
    match v {
        Value::Number(n) if n.as_i64().is_some() => Ok(v.clone()),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Value::Number((f as i64).into()))
            .ok_or_else(|| TemplateError::Eval(format!("not an integer: {}", n))),
        _ => to_i64(v).map(|n| Value::Number(n.into())),
    }
}

fn fn_float(args: &[Value]) -> Result<Value, TemplateError> {
    let v = one_arg("float", args)?;
    let f = to_f64(v)?;
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TemplateError::Eval(format!("not a number: {}", value_to_display(v))))
}

fn fn_boolean(args: &[Value]) -> Result<Value, TemplateError> {
    let v = one_arg("boolean", args)?;
    match v {
        Value::Bool(_) => Ok(v.clone()),
        Value::String(s) => match s.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
            _ => Err(TemplateError::Eval(format!("not a boolean: {}", s))),
        },
        other => Err(TemplateError::Eval(format!(
            "not a boolean: {}",
            value_to_display(other)
        ))),
    }
}

fn fn_string(args: &[Value]) -> Result<Value, TemplateError> {
    let v = one_arg("string", args)?;
    Ok(Value::String(value_to_display(v)))
}

fn fn_split(args: &[Value]) -> Result<Value, TemplateError> {
    let s = string_arg("split", args, 0)?;
    let sep = string_arg("split", args, 1)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(&sep).map(|p| Value::String(p.to_string())).collect()
    };
    Ok(Value::Array(parts))
}

fn fn_join(args: &[Value]) -> Result<Value, TemplateError> {
    let list = match args.first() {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(TemplateError::Eval(format!(
                "join: first argument must be a list, got {}",
                value_to_display(other)
            )))
        }
        None => return Err(TemplateError::Eval("join: missing argument 1".into())),
    };
    let sep = string_arg("join", args, 1)?;
    let joined = list
        .iter()
        .map(value_to_display)
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Value::String(joined))
}

fn fn_sequence(args: &[Value]) -> Result<Value, TemplateError> {
    let (from, to) = int_pair("sequence", args)?;
    let items = (from..=to).map(|n| Value::Number(n.into())).collect();
    Ok(Value::Array(items))
}

/// `single "resource/id" "query"`: one row by id.
struct SingleFn;

#[async_trait]
impl TemplateFunction for SingleFn {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        let path = string_arg("single", &args, 0)?;
        let query = opt_string_arg("single", &args, 1)?;
        let trimmed = path.trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let &[resource, id] = &segments[..] else {
            return Err(TemplateError::Eval(format!(
                "single: path must be resource/id, got {}",
                path
            )));
        };
        Ok(ctx.store.get_single(resource, id, &query).await?)
    }
}

/// `multi "resource" "query"`: all matching rows.
struct MultiFn;

#[async_trait]
impl TemplateFunction for MultiFn {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        let path = string_arg("multi", &args, 0)?;
        let query = opt_string_arg("multi", &args, 1)?;
        let rows = ctx
            .store
            .get_multi(path.trim_matches('/'), &query)
            .await?;
        Ok(Value::Array(rows))
    }
}

/// `first "resource" "query"`: first matching row; empty result is an error.
struct FirstFn;

#[async_trait]
impl TemplateFunction for FirstFn {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        let path = string_arg("first", &args, 0)?;
        let query = opt_string_arg("first", &args, 1)?;
        let rows = ctx
            .store
            .get_multi(path.trim_matches('/'), &query)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| TemplateError::Eval("no record selected".into()))
    }
}

/// `total "resource"`: row count.
struct TotalFn;

#[async_trait]
impl TemplateFunction for TotalFn {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        let path = string_arg("total", &args, 0)?;
        let n = ctx.store.total(path.trim_matches('/')).await?;
        Ok(Value::Number(n.into()))
    }
}

/// `include "name" "p[arg]=value&..."`: render another template by name with
/// parameter overrides, sharing this render's store handle and depth budget.
struct IncludeFn;

#[async_trait]
impl TemplateFunction for IncludeFn {
    async fn call(
        &self,
        ctx: &mut RenderContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, TemplateError> {
        let name = string_arg("include", &args, 0)?;
        let query = opt_string_arg("include", &args, 1)?;
        if ctx.depth >= MAX_INCLUDE_DEPTH {
            return Err(TemplateError::IncludeDepthExceeded(MAX_INCLUDE_DEPTH));
        }
        let record = fetch_template(&mut *ctx.store, &TemplateSelector::Name(&name)).await?;
        let overrides = parse_p_params(&query);
        let scope = build_scope(&record.template_arguments, &overrides)?;
        let renderer = Renderer::parse(&record.content)?;
        ctx.depth += 1;
        let rendered = renderer.render(ctx, &scope).await;
        ctx.depth -= 1;
        Ok(Value::String(rendered?))
    }
}
