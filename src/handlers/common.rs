//! Common handlers: resource listing at the root, health, version.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

pub async fn version() -> Json<Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Endpoint listing: every registered resource plus the fixed endpoints,
/// name to URL path.
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let mut endpoints = Map::new();
    for resource in state.registry.iter() {
        endpoints.insert(
            resource.name.clone(),
            Value::String(format!("/{}", resource.path)),
        );
    }
    endpoints.insert(
        "template_generations".into(),
        Value::String("/template_generations/{id}".into()),
    );
    endpoints.insert("design".into(), Value::String("/design/present".into()));
    Json(Value::Object(endpoints))
}
