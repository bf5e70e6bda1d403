use sqlx::sqlite::SqlitePool;

use common::models::ChatSession;

use crate::generate_id;

const SESSION_COLUMNS: &str = "id, source_id, session_id, start_time, end_time, ip_address, \
     country, language, messages_sent, sentiment, escalated, forwarded_hr, transcript_url, \
     avg_response_time, tokens, tokens_eur, category, initial_msg, user_rating";

/// Field values for a session upsert. Timestamps are RFC 3339 strings.
pub struct SessionParams<'a> {
    pub session_id: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub ip_address: Option<&'a str>,
    pub country: Option<&'a str>,
    pub language: Option<&'a str>,
    pub messages_sent: Option<i64>,
    pub sentiment: Option<&'a str>,
    pub escalated: Option<bool>,
    pub forwarded_hr: Option<bool>,
    pub transcript_url: Option<&'a str>,
    pub avg_response_time: Option<f64>,
    pub tokens: Option<i64>,
    pub tokens_eur: Option<f64>,
    pub category: Option<&'a str>,
    pub initial_msg: Option<&'a str>,
    pub user_rating: Option<i64>,
}

/// Create-or-update keyed by (source_id, session_id). Returns the session's
/// primary key and whether a new row was created.
pub async fn upsert_session(
    pool: &SqlitePool,
    source_id: &str,
    params: &SessionParams<'_>,
) -> anyhow::Result<(String, bool)> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM chat_sessions WHERE source_id = ? AND session_id = ?")
            .bind(source_id)
            .bind(params.session_id)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = existing {
        sqlx::query(
            "UPDATE chat_sessions SET start_time = ?, end_time = ?, ip_address = ?, \
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
        .execute(pool)
        .await?;
        return Ok((id, false));
    }

    let id = generate_id();
    sqlx::query(
        "INSERT INTO chat_sessions (id, source_id, session_id, start_time, end_time, \
         ip_address, country, language, messages_sent, sentiment, escalated, forwarded_hr, \
         transcript_url, avg_response_time, tokens, tokens_eur, category, initial_msg, \
         user_rating) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(source_id)
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
    .execute(pool)
    .await?;
    Ok((id, true))
}

pub async fn get_session(
    pool: &SqlitePool,
    source_id: &str,
    session_id: &str,
) -> anyhow::Result<Option<ChatSession>> {
    Ok(sqlx::query_as::<_, ChatSession>(&format!(
        "SELECT {} FROM chat_sessions WHERE source_id = ? AND session_id = ?",
        SESSION_COLUMNS
    ))
    .bind(source_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn list_sessions_for_source(
    pool: &SqlitePool,
    source_id: &str,
) -> anyhow::Result<Vec<ChatSession>> {
    Ok(sqlx::query_as::<_, ChatSession>(&format!(
        "SELECT {} FROM chat_sessions WHERE source_id = ? ORDER BY session_id",
        SESSION_COLUMNS
    ))
    .bind(source_id)
    .fetch_all(pool)
    .await?)
}

pub async fn count_sessions(pool: &SqlitePool, source_id: &str) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_sessions WHERE source_id = ?")
        .bind(source_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
