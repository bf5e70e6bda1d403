use sqlx::sqlite::SqlitePool;

use common::models::DataSource;

use crate::generate_id;

/// Mirror of a chat session's fields with nulls already substituted
/// (empty string / false / 0) for the dashboard-facing schema.
pub struct DashboardSessionParams<'a> {
    pub session_id: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub ip_address: Option<&'a str>,
    pub country: &'a str,
    pub language: &'a str,
    pub messages_sent: i64,
    pub sentiment: &'a str,
    pub escalated: bool,
    pub forwarded_hr: bool,
    pub transcript_url: &'a str,
    pub avg_response_time: Option<f64>,
    pub tokens: i64,
    pub tokens_eur: Option<f64>,
    pub category: &'a str,
    pub initial_msg: &'a str,
    pub user_rating: &'a str,
}

pub async fn create_data_source(
    pool: &SqlitePool,
    name: &str,
    company: &str,
    external_source_id: Option<&str>,
) -> anyhow::Result<String> {
    let id = generate_id();
    sqlx::query(
        "INSERT INTO data_sources (id, name, company, external_source_id) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(company)
    .bind(external_source_id)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Dashboard data sources linked to any external source, optionally
/// narrowed to one external source.
pub async fn list_linked_data_sources(
    pool: &SqlitePool,
    external_source_id: Option<&str>,
) -> anyhow::Result<Vec<DataSource>> {
    let rows = match external_source_id {
        Some(ext_id) => {
            sqlx::query_as::<_, DataSource>(
                "SELECT id, name, company, external_source_id, created_at FROM data_sources \
                 WHERE external_source_id = ? ORDER BY created_at",
            )
            .bind(ext_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DataSource>(
                "SELECT id, name, company, external_source_id, created_at FROM data_sources \
                 WHERE external_source_id IS NOT NULL ORDER BY created_at",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Create-or-update keyed by (data_source_id, session_id), wrapped in a
/// transaction so a crash mid-sync cannot leave a half-updated mirror row.
/// Returns true when a new row was created.
pub async fn upsert_dashboard_session(
    pool: &SqlitePool,
    data_source_id: &str,
    params: &DashboardSessionParams<'_>,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM dashboard_sessions WHERE data_source_id = ? AND session_id = ?",
    )
    .bind(data_source_id)
    .bind(params.session_id)
    .fetch_optional(&mut *tx)
    .await?;

    let created = existing.is_none();

    if let Some((id,)) = existing {
        sqlx::query(
            "UPDATE dashboard_sessions SET start_time = ?, end_time = ?, ip_address = ?, \
             country = ?, language = ?, messages_sent = ?, sentiment = ?, escalated = ?, \
             forwarded_hr = ?, transcript_url = ?, avg_response_time = ?, tokens = ?, \
             tokens_eur = ?, category = ?, initial_msg = ?, user_rating = ? WHERE id = ?",
        )
        .bind(params.start_time)
        .bind(params.end_time)
        .bind(params.ip_address)
        .bind(params.country)
        .bind(params.language)
        .bind(params.messages_sent)
        .bind(params.sentiment)
        .bind(params.escalated)
        .bind(params.forwarded_hr)
        .bind(params.transcript_url)
        .bind(params.avg_response_time)
        .bind(params.tokens)
        .bind(params.tokens_eur)
        .bind(params.category)
        .bind(params.initial_msg)
        .bind(params.user_rating)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query(
            "INSERT INTO dashboard_sessions (id, data_source_id, session_id, start_time, \
             end_time, ip_address, country, language, messages_sent, sentiment, escalated, \
             forwarded_hr, transcript_url, avg_response_time, tokens, tokens_eur, category, \
             initial_msg, user_rating) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(generate_id())
        .bind(data_source_id)
        .bind(params.session_id)
        .bind(params.start_time)
        .bind(params.end_time)
        .bind(params.ip_address)
        .bind(params.country)
        .bind(params.language)
        .bind(params.messages_sent)
        .bind(params.sentiment)
        .bind(params.escalated)
        .bind(params.forwarded_hr)
        .bind(params.transcript_url)
        .bind(params.avg_response_time)
        .bind(params.tokens)
        .bind(params.tokens_eur)
        .bind(params.category)
        .bind(params.initial_msg)
        .bind(params.user_rating)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(created)
}

pub async fn count_dashboard_sessions(
    pool: &SqlitePool,
    data_source_id: &str,
) -> anyhow::Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM dashboard_sessions WHERE data_source_id = ?")
            .bind(data_source_id)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn clear_dashboard_sessions(
    pool: &SqlitePool,
    data_source_id: &str,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM dashboard_sessions WHERE data_source_id = ?")
        .bind(data_source_id)
        .execute(pool)
        .await?;
    Ok(())
}
