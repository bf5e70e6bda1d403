use sqlx::sqlite::SqlitePool;

use common::models::ChatMessage;

use crate::generate_id;

/// One message ready for storage: sender label, raw text, sanitized HTML.
pub struct MessageParams {
    pub sender: String,
    pub message: String,
    pub safe_html: String,
}

/// Replace the full message set for a session in one transaction, so a
/// reprocessed transcript can never leave deleted-but-not-reinserted rows
/// behind. Returns the number of messages written.
pub async fn replace_messages(
    pool: &SqlitePool,
    session_pk: &str,
    messages: &[MessageParams],
) -> anyhow::Result<u32> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chat_messages WHERE session_pk = ?")
        .bind(session_pk)
        .execute(&mut *tx)
        .await?;

    for (seq, msg) in messages.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chat_messages (id, session_pk, seq, sender, message, safe_html) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(generate_id())
        .bind(session_pk)
        .bind(seq as i64)
        .bind(&msg.sender)
        .bind(&msg.message)
        .bind(&msg.safe_html)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(messages.len() as u32)
}

pub async fn list_messages(
    pool: &SqlitePool,
    session_pk: &str,
) -> anyhow::Result<Vec<ChatMessage>> {
    Ok(sqlx::query_as::<_, ChatMessage>(
        "SELECT id, session_pk, seq, sender, message, safe_html, created_at \
         FROM chat_messages WHERE session_pk = ? ORDER BY seq",
    )
    .bind(session_pk)
    .fetch_all(pool)
    .await?)
}

pub async fn count_messages(pool: &SqlitePool, session_pk: &str) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_messages WHERE session_pk = ?")
        .bind(session_pk)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
