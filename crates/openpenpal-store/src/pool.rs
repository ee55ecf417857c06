//! Connection bootstrap. A thin wrapper around `sqlx::PgPool` that runs the
//! embedded migrations once at startup so every repository can assume the
//! schema already exists.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreConnectError {
    #[error("failed to connect to the database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Opens a pool against `database_url` and applies pending migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreConnectError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(StoreConnectError::Connect)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(StoreConnectError::Migrate)?;

    info!(max_connections, "database pool ready");
    Ok(pool)
}
