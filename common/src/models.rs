use serde::{Deserialize, Serialize};

/// A configured remote endpoint providing chat session and transcript data.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExternalSource {
    #[sqlx(try_from = "String")]
    pub id: uuid::Uuid,
    pub name: String,
    pub api_url: String,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub is_active: bool,
    pub sync_interval: i64,
    pub timeout: i64,
    pub last_synced: Option<String>,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub created_at: Option<String>,
}

impl ExternalSource {
    /// Human-readable status string for source listings.
    pub fn status(&self) -> String {
        if !self.is_active {
            return "Inactive".to_string();
        }
        if self.last_synced.is_none() {
            return "Never synced".to_string();
        }
        if self.error_count > 0 {
            return format!("Error ({})", self.error_count);
        }
        "Active".to_string()
    }
}

/// Canonical chat session ingested from an external source, unique per
/// (source_id, session_id). Timestamps are RFC 3339 in UTC.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatSession {
    #[sqlx(try_from = "String")]
    pub id: uuid::Uuid,
    #[sqlx(try_from = "String")]
    pub source_id: uuid::Uuid,
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub messages_sent: Option<i64>,
    pub sentiment: Option<String>,
    pub escalated: Option<bool>,
    pub forwarded_hr: Option<bool>,
    pub transcript_url: Option<String>,
    pub avg_response_time: Option<f64>,
    pub tokens: Option<i64>,
    pub tokens_eur: Option<f64>,
    pub category: Option<String>,
    pub initial_msg: Option<String>,
    pub user_rating: Option<i64>,
}

/// One sender-attributed message segmented out of a session transcript.
/// `seq` preserves creation order; `safe_html` is the sanitized rendering.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    #[sqlx(try_from = "String")]
    pub id: uuid::Uuid,
    #[sqlx(try_from = "String")]
    pub session_pk: uuid::Uuid,
    pub seq: i64,
    pub sender: String,
    pub message: String,
    pub safe_html: String,
    pub created_at: Option<String>,
}

/// A company-scoped dashboard data source, optionally linked to an
/// external source it mirrors.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DataSource {
    #[sqlx(try_from = "String")]
    pub id: uuid::Uuid,
    pub name: String,
    pub company: String,
    pub external_source_id: Option<String>,
    pub created_at: Option<String>,
}

/// Dashboard-facing mirror of a ChatSession, keyed by
/// (data_source_id, session_id). Text fields are never null here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DashboardSession {
    #[sqlx(try_from = "String")]
    pub id: uuid::Uuid,
    #[sqlx(try_from = "String")]
    pub data_source_id: uuid::Uuid,
    pub session_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub ip_address: Option<String>,
    pub country: String,
    pub language: String,
    pub messages_sent: i64,
    pub sentiment: String,
    pub escalated: bool,
    pub forwarded_hr: bool,
    pub transcript_url: String,
    pub avg_response_time: Option<f64>,
    pub tokens: i64,
    pub tokens_eur: Option<f64>,
    pub category: String,
    pub initial_msg: String,
    pub user_rating: String,
}
