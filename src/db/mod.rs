pub mod models;
pub mod profiles;

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// Opens (creating if needed) the profile database and applies migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {db_path}");
    Ok(pool)
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    // One connection: every in-memory connection is a separate database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
