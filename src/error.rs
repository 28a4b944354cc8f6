//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while parsing or rendering a template. The whole render
/// aborts on the first error; there is no partial output.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template parse: {0}")]
    Parse(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("undefined variable: .{0}")]
    UndefinedVariable(String),
    #[error("parameter type mismatch: {argument} must be {expected}, but value is {value}")]
    Coerce {
        argument: String,
        expected: &'static str,
        value: String,
    },
    #[error("include depth limit of {0} exceeded")]
    IncludeDepthExceeded(usize),
    #[error("{0}")]
    Eval(String),
    #[error("store: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

// Store failures inside template functions surface as render errors so the
// engine reports them verbatim at the point of evaluation.
impl From<AppError> for TemplateError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Template(e) => e,
            other => TemplateError::Store(other.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Template(_) => (StatusCode::BAD_REQUEST, "template_error"),
            AppError::Serialize(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert_eq!(
            AppError::Serialize(serde_err).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Db(sqlx::Error::RowNotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
