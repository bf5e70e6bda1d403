use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

pub mod dashboard;
pub mod messages;
pub mod sessions;
pub mod sources;

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

pub async fn init_pool(db_path: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema. Statements are idempotent (IF NOT EXISTS) so
/// this is safe to run on every startup. Tests use this against an
/// in-memory pool built with a single connection.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    for stmt in include_str!("../../migrations/001_init.sql").split(';') {
        let stmt = stmt.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}
