//! Router assembly.
//!
//! Static segments (`/design/present`, `/template_generations/...`) are
//! matched before the generic `/:path_segment` resource routes.

use crate::error::{ErrorBody, ErrorDetail};
use crate::handlers::{common, design, generation, resource};
use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(common::root))
        .route("/health", get(common::health))
        .route("/version", get(common::version))
        .route(
            "/design/present",
            get(design::read)
                .put(design::replace)
                .delete(design::clear),
        )
        .route("/template_generations/:id", get(generation::by_id))
        .route(
            "/template_generations/name/:name",
            get(generation::by_name),
        )
        .route(
            "/:path_segment",
            get(resource::list)
                .post(resource::create)
                .options(resource::options),
        )
        .route(
            "/:path_segment/:id",
            get(resource::read)
                .put(resource::update)
                .patch(resource::update)
                .delete(resource::delete),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    tracing::error!(%message, "panic in handler");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: ErrorDetail {
                code: "internal_error".to_string(),
                message,
            },
        }),
    )
        .into_response()
}
