use sqlx::sqlite::SqlitePool;

use common::models::ExternalSource;

use crate::generate_id;

const SOURCE_COLUMNS: &str = "id, name, api_url, auth_username, auth_password, is_active, \
     sync_interval, timeout, last_synced, error_count, last_error, created_at";

pub async fn list_sources(pool: &SqlitePool) -> anyhow::Result<Vec<ExternalSource>> {
    Ok(sqlx::query_as::<_, ExternalSource>(&format!(
        "SELECT {} FROM external_sources ORDER BY created_at",
        SOURCE_COLUMNS
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn list_active_sources(pool: &SqlitePool) -> anyhow::Result<Vec<ExternalSource>> {
    Ok(sqlx::query_as::<_, ExternalSource>(&format!(
        "SELECT {} FROM external_sources WHERE is_active = 1 ORDER BY created_at",
        SOURCE_COLUMNS
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn first_active_source(pool: &SqlitePool) -> anyhow::Result<Option<ExternalSource>> {
    Ok(sqlx::query_as::<_, ExternalSource>(&format!(
        "SELECT {} FROM external_sources WHERE is_active = 1 ORDER BY created_at LIMIT 1",
        SOURCE_COLUMNS
    ))
    .fetch_optional(pool)
    .await?)
}

pub async fn get_active_source(
    pool: &SqlitePool,
    id: &str,
) -> anyhow::Result<Option<ExternalSource>> {
    Ok(sqlx::query_as::<_, ExternalSource>(&format!(
        "SELECT {} FROM external_sources WHERE id = ? AND is_active = 1",
        SOURCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub struct CreateSourceParams<'a> {
    pub name: &'a str,
    pub api_url: &'a str,
    pub auth_username: Option<&'a str>,
    pub auth_password: Option<&'a str>,
    pub sync_interval: i64,
    pub timeout: i64,
}

pub async fn create_source(
    pool: &SqlitePool,
    params: &CreateSourceParams<'_>,
) -> anyhow::Result<String> {
    let id = generate_id();
    sqlx::query(
        "INSERT INTO external_sources (id, name, api_url, auth_username, auth_password, \
         sync_interval, timeout) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(params.name)
    .bind(params.api_url)
    .bind(params.auth_username)
    .bind(params.auth_password)
    .bind(params.sync_interval)
    .bind(params.timeout)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Record a fully successful sync: stamp last_synced and clear the error state.
pub async fn mark_synced(pool: &SqlitePool, id: &str, synced_at: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE external_sources SET last_synced = ?, error_count = 0, last_error = NULL \
         WHERE id = ?",
    )
    .bind(synced_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failed sync attempt. The consecutive-error counter persists and
/// grows across failures; the caller is expected to pass an already-truncated
/// message (255 chars).
pub async fn record_sync_error(pool: &SqlitePool, id: &str, error: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE external_sources SET error_count = error_count + 1, last_error = ? WHERE id = ?",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
