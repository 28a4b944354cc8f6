//! Store-backed tests for the design snapshot and transaction semantics.
//! They need a reachable PostgreSQL server and no-op when DATABASE_URL is
//! unset. Each test uses its own database so they can run in parallel.

use kiln::builtin;
use kiln::design::AccessorRegistry;
use kiln::migration;
use kiln::query::QueryOptions;
use kiln::service::CrudService;
use kiln::store::{connect_pool, ensure_database_exists};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

async fn test_pool(db_name: &str) -> Option<PgPool> {
    let base = std::env::var("DATABASE_URL").ok()?;
    let cut = base.rfind('/').expect("DATABASE_URL must contain a database path");
    let url = format!("{}/{}", &base[..cut], db_name);
    ensure_database_exists(&url).await.expect("create test database");
    let pool = connect_pool(&url, 2).await.expect("connect");

    let registry = Arc::new(builtin::registry());
    let mut conn = pool.acquire().await.expect("acquire");
    migration::run(&mut conn, &registry).await.expect("migrate");
    AccessorRegistry::generic(&registry)
        .clear_all(&mut conn)
        .await
        .expect("start from an empty store");
    Some(pool)
}

fn body(v: Value) -> HashMap<String, Value> {
    v.as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[tokio::test]
async fn design_import_reproduces_the_exported_snapshot() {
    let Some(pool) = test_pool("kiln_test_design_roundtrip").await else {
        return;
    };
    let registry = Arc::new(builtin::registry());
    let accessors = AccessorRegistry::generic(&registry);
    let templates = registry.by_path("templates").unwrap();
    let arguments = registry.by_path("template_arguments").unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let t = CrudService::create(
        &mut conn,
        templates,
        &body(json!({"name": "greeting", "content": "Hello {{.name}}"})),
    )
    .await
    .unwrap();
    CrudService::create(
        &mut conn,
        arguments,
        &body(json!({
            "template_id": t["id"],
            "name": "name",
            "type": "string",
            "default_value": "world",
        })),
    )
    .await
    .unwrap();

    let before = accessors.export(&mut conn).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    accessors.import(&mut tx, &before).await.unwrap();
    tx.commit().await.unwrap();

    let after = accessors.export(&mut conn).await.unwrap();
    assert_eq!(before, after);

    // The imported ids must not collide with subsequent inserts.
    let extra = CrudService::create(
        &mut conn,
        templates,
        &body(json!({"name": "second", "content": "x"})),
    )
    .await
    .unwrap();
    assert_ne!(extra["id"], t["id"]);
}

#[tokio::test]
async fn failed_update_rolls_back_the_whole_transaction() {
    let Some(pool) = test_pool("kiln_test_update_rollback").await else {
        return;
    };
    let registry = Arc::new(builtin::registry());
    let templates = registry.by_path("templates").unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let row = CrudService::create(
        &mut conn,
        templates,
        &body(json!({"name": "base", "content": "x"})),
    )
    .await
    .unwrap();
    let id = row["id"].clone();

    // First statement succeeds, second violates NOT NULL. The handler path
    // drops the transaction on error, so neither change may land.
    let mut tx = pool.begin().await.unwrap();
    CrudService::update(&mut tx, templates, &id, &body(json!({"content": "changed"})))
        .await
        .unwrap();
    let err = CrudService::update(&mut tx, templates, &id, &body(json!({"name": null}))).await;
    assert!(err.is_err());
    drop(tx);

    let current = CrudService::get(&mut conn, &registry, templates, &QueryOptions::default(), &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current["name"], json!("base"));
    assert_eq!(current["content"], json!("x"));
}
