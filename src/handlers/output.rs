//! Response emission: plain JSON, `pretty` indented JSON, and `stream`
//! newline-delimited JSON for list results. Serialization failures
//! propagate as `AppError` so every error leaves through the same envelope.

use crate::error::AppError;
use crate::query::QueryOptions;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

pub fn one(row: Value, opts: &QueryOptions) -> Result<Response, AppError> {
    if opts.pretty {
        pretty(&row)
    } else {
        Ok(Json(row).into_response())
    }
}

pub fn many(rows: Vec<Value>, opts: &QueryOptions) -> Result<Response, AppError> {
    if opts.stream {
        let mut body = String::new();
        for row in &rows {
            body.push_str(&serde_json::to_string(row)?);
            body.push('\n');
        }
        Ok((
            [(header::CONTENT_TYPE, "application/x-ndjson")],
            body,
        )
            .into_response())
    } else if opts.pretty {
        pretty(&Value::Array(rows))
    } else {
        Ok(Json(Value::Array(rows)).into_response())
    }
}

fn pretty(v: &Value) -> Result<Response, AppError> {
    let body = serde_json::to_string_pretty(v)?;
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn opts(stream: bool, pretty: bool) -> QueryOptions {
        QueryOptions {
            stream,
            pretty,
            ..QueryOptions::default()
        }
    }

    #[test]
    fn default_list_output_is_json() {
        let resp = many(vec![json!({"id": 1})], &opts(false, false)).unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn stream_output_is_ndjson() {
        let resp = many(vec![json!({"id": 1}), json!({"id": 2})], &opts(true, false)).unwrap();
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/x-ndjson"
        );
    }

    #[test]
    fn pretty_output_is_indented_json() {
        let resp = one(json!({"id": 1}), &opts(false, true)).unwrap();
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
