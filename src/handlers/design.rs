//! Design snapshot handlers: export, replace, clear.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

pub async fn read(State(state): State<AppState>) -> Result<Response, AppError> {
    let mut tx = state.pool.begin().await?;
    let snapshot = state.accessors.export(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(snapshot).into_response())
}

/// Replace the whole store with the posted snapshot, atomically. The
/// response is the snapshot as re-read from the store.
pub async fn replace(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let mut tx = state.pool.begin().await?;
    state.accessors.import(&mut tx, &body).await?;
    let snapshot = state.accessors.export(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(snapshot).into_response())
}

pub async fn clear(State(state): State<AppState>) -> Result<Response, AppError> {
    let mut tx = state.pool.begin().await?;
    state.accessors.clear_all(&mut tx).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
