//! Demo server: the built-in template resources served over Postgres.
//!
//! Configuration via environment (or .env): DATABASE_URL, HOST, PORT.
//! `-v` prints the version and exits.

use kiln::store::{connect_pool, ensure_database_exists};
use kiln::template;
use kiln::{builtin, migration, router, AppState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().any(|a| a == "-v" || a == "--version") {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kiln=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/kiln".into());
    ensure_database_exists(&database_url).await?;
    let pool = connect_pool(&database_url, 5).await?;

    let registry = builtin::registry();
    let mut conn = pool.acquire().await?;
    migration::run(&mut conn, &registry).await?;
    drop(conn);

    let state = AppState::new(pool, registry, template::builtins());
    let app = router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    let listener = TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
