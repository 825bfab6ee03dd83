use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use deadpool_diesel::postgres::{Manager, Pool};
use deadpool_diesel::Runtime;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use relay_backend::{
    config::Config,
    llm::gemini_client::GeminiBackend,
    logging::init_subscriber,
    middleware::RateLimiter,
    routes::app_router,
    services::PgMessageStore,
    state::{AppState, DbPool},
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_subscriber(config.debug);
    info!(config = ?config, "Configuration loaded");

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let manager = Manager::new(database_url, Runtime::Tokio1);
    let pool = Pool::builder(manager)
        .build()
        .context("Failed to build database connection pool")?;

    run_migrations(&pool).await?;

    let store = Arc::new(PgMessageStore::new(pool));
    let generation =
        Arc::new(GeminiBackend::new(&config).context("Failed to construct generation backend")?);
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ));

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        store,
        generation,
        rate_limiter,
    };

    let app = app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get connection for migrations")?;
    conn.interact(|conn| {
        conn.run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.len())
            .map_err(|e| anyhow::anyhow!("Migration failure: {e}"))
    })
    .await
    .map_err(|e| anyhow::anyhow!("Migration task panicked: {e}"))?
    .map(|applied| info!(applied, "Database migrations up to date"))
}
