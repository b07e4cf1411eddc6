//! Database schema and migrations.

use super::{DbError, DbPool};
use tracing::info;

/// Applies every pending migration under `src/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Running SQLite migrations");
    sqlx::migrate!("src/db/migrations").run(pool.inner()).await?;
    info!("Migrations completed successfully");
    Ok(())
}
