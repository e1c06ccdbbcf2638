use anyhow::Context;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ticketdesk::api_router;
use ticketdesk::config::AppConfig;
use ticketdesk::shared::state::AppState;
use ticketdesk::shared::utils::create_conn;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_conn(&config.database_url)?;

    {
        let mut conn = pool.get().context("failed to get migration connection")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    }

    tokio::fs::create_dir_all(&config.storage.upload_dir)
        .await
        .context("failed to create upload directory")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { conn: pool, config });

    let app = api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
