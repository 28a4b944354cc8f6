//! Template generation handlers.
//!
//! `p[name]=value` query parameters override argument defaults. The render
//! runs over a single pooled connection which every store function and
//! nested include shares.

use crate::error::AppError;
use crate::state::AppState;
use crate::store::SqlStore;
use crate::template::{self, TemplateSelector};
use axum::{
    extract::{Path, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
};

pub async fn by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    generate(&state, TemplateSelector::Id(&id), query).await
}

pub async fn by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    generate(&state, TemplateSelector::Name(&name), query).await
}

async fn generate(
    state: &AppState,
    selector: TemplateSelector<'_>,
    query: Option<String>,
) -> Result<Response, AppError> {
    let overrides = template::parse_p_params(query.as_deref().unwrap_or(""));
    let mut conn = state.pool.acquire().await?;
    let mut store = SqlStore::new(&mut conn, &state.registry);
    let out = template::generate(&mut store, &state.functions, &selector, &overrides).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        out,
    )
        .into_response())
}
