//! Typed template arguments and value coercion.
//!
//! Coercion rules: native-typed values pass through; string values are
//! parsed per the declared type; anything else is a typed mismatch naming
//! the argument and the expected type.

use crate::error::TemplateError;
use serde::Deserialize;
use serde_json::Value;

/// Declared type of a template argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Int,
    Float,
    Bool,
    String,
}

impl ArgumentType {
    pub fn name(&self) -> &'static str {
        match self {
            ArgumentType::Int => "int",
            ArgumentType::Float => "float",
            ArgumentType::Bool => "bool",
            ArgumentType::String => "string",
        }
    }
}

/// A template row with its arguments preloaded, as returned by the store.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateRecord {
    pub id: i64,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub template_arguments: Vec<TemplateArgumentRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TemplateArgumentRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    pub default_value: String,
}

fn mismatch(argument: &str, expected: &'static str, value: &Value) -> TemplateError {
    TemplateError::Coerce {
        argument: argument.to_string(),
        expected,
        value: crate::template::engine::value_to_display(value),
    }
}

/// Coerce `value` to the declared type of `argument`.
pub fn coerce(argument: &str, kind: ArgumentType, value: &Value) -> Result<Value, TemplateError> {
    match kind {
        ArgumentType::Int => match value {
            Value::Number(n) if n.as_i64().is_some() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| mismatch(argument, "int", value)),
            _ => Err(mismatch(argument, "int", value)),
        },
        ArgumentType::Float => match value {
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(|| mismatch(argument, "float", value))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| mismatch(argument, "float", value))
            }
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(argument, "float", value)),
            _ => Err(mismatch(argument, "float", value)),
        },
        ArgumentType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
                _ => Err(mismatch(argument, "bool", value)),
            },
            _ => Err(mismatch(argument, "bool", value)),
        },
        ArgumentType::String => match value {
            Value::String(_) => Ok(value.clone()),
            other => Ok(Value::String(crate::template::engine::value_to_display(
                other,
            ))),
        },
    }
}

/// Build the render scope for a template: every declared argument gets its
/// coerced default, then `p[...]` overrides are coerced on top. Overrides
/// without a declared argument are errors.
pub fn build_scope(
    arguments: &[TemplateArgumentRecord],
    overrides: &[(String, String)],
) -> Result<Value, TemplateError> {
    let mut scope = serde_json::Map::new();
    for arg in arguments {
        let coerced = coerce(
            &arg.name,
            arg.kind,
            &Value::String(arg.default_value.clone()),
        )?;
        scope.insert(arg.name.clone(), coerced);
    }
    for (name, raw) in overrides {
        let Some(arg) = arguments.iter().find(|a| a.name == *name) else {
            return Err(TemplateError::Eval(format!(
                "the argument related to a parameter {} does not exist",
                name
            )));
        };
        let coerced = coerce(name, arg.kind, &Value::String(raw.clone()))?;
        scope.insert(name.clone(), coerced);
    }
    Ok(Value::Object(scope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arg(name: &str, kind: ArgumentType, default_value: &str) -> TemplateArgumentRecord {
        TemplateArgumentRecord {
            name: name.into(),
            kind,
            default_value: default_value.into(),
        }
    }

    #[test]
    fn native_values_pass_through() {
        assert_eq!(coerce("n", ArgumentType::Int, &json!(3)).unwrap(), json!(3));
        assert_eq!(
            coerce("f", ArgumentType::Float, &json!(1.5)).unwrap(),
            json!(1.5)
        );
        assert_eq!(
            coerce("b", ArgumentType::Bool, &json!(true)).unwrap(),
            json!(true)
        );
        assert_eq!(
            coerce("s", ArgumentType::String, &json!("x")).unwrap(),
            json!("x")
        );
    }

    #[test]
    fn strings_parse_per_declared_type() {
        assert_eq!(
            coerce("n", ArgumentType::Int, &json!("42")).unwrap(),
            json!(42)
        );
        assert_eq!(
            coerce("f", ArgumentType::Float, &json!("2.5")).unwrap(),
            json!(2.5)
        );
        assert_eq!(
            coerce("b", ArgumentType::Bool, &json!("true")).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn mismatch_names_argument_and_expected_type() {
        let err = coerce("ratio", ArgumentType::Float, &json!("abc")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ratio"));
        assert!(msg.contains("float"));
    }

    #[test]
    fn non_coercible_bool_fails() {
        assert!(coerce("flag", ArgumentType::Bool, &json!("yes")).is_err());
        assert!(coerce("flag", ArgumentType::Bool, &json!(2)).is_err());
    }

    #[test]
    fn scope_uses_defaults_then_overrides() {
        let args = vec![
            arg("name", ArgumentType::String, "world"),
            arg("count", ArgumentType::Int, "3"),
        ];
        let scope = build_scope(&args, &[]).unwrap();
        assert_eq!(scope, json!({"name": "world", "count": 3}));

        let scope = build_scope(&args, &[("name".into(), "Rust".into())]).unwrap();
        assert_eq!(scope, json!({"name": "Rust", "count": 3}));
    }

    #[test]
    fn override_for_unknown_argument_is_an_error() {
        let args = vec![arg("name", ArgumentType::String, "world")];
        let err = build_scope(&args, &[("other".into(), "x".into())]).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn bad_default_fails_at_scope_build() {
        let args = vec![arg("count", ArgumentType::Int, "not-a-number")];
        assert!(build_scope(&args, &[]).is_err());
    }
}
