//! Database pool and migrations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::LedgerResult;

/// Create a pool for `database_url` and run migrations.
pub async fn create_pool_and_migrate(database_url: &str, max_connections: u32) -> LedgerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> LedgerResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
