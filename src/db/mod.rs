use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod catalog_queries;
pub mod queries;
pub mod user_queries;

/// Initialize the PostgreSQL connection pool.
///
/// Each running recognition holds a connection for its catalog transaction,
/// so the pool is sized above the worker count.
pub async fn init_pool(database_url: &str, max_workers: usize) -> Result<PgPool, sqlx::Error> {
    let max_connections = (max_workers as u32).saturating_add(8).max(10);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
