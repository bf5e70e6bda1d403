use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tokio::sync::mpsc::UnboundedSender;

use common::config::{AppConfig, EnvOverrides};
use common::models::ExternalSource;
use common::truncate::truncate_chars;
use db::messages::MessageParams;
use db::sessions::SessionParams;

use crate::normalize::{normalize_row, NormalizedSession, RowError};
use crate::reconcile::SessionWritten;
use crate::sanitize::sanitize_html;
use crate::segment::segment_transcript;

/// Length cap for the persisted last_error column.
const MAX_ERROR_LEN: usize = 255;

/// Accumulated outcome of one source sync. Row-level failures are carried
/// as first-class values here instead of being counted from inside error
/// handlers.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub sessions_created: u32,
    pub sessions_updated: u32,
    pub transcripts_processed: u32,
    pub messages_created: u32,
    pub errors: Vec<RowError>,
}

impl SyncStats {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} transcripts ({} messages), {} errors",
            self.sessions_created,
            self.sessions_updated,
            self.transcripts_processed,
            self.messages_created,
            self.errors.len()
        )
    }
}

/// Per-source breakdown of a periodic (all-sources) run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub succeeded: Vec<(String, SyncStats)>,
    pub failed: Vec<(String, String)>,
}

impl SyncSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} sources succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// Sync one explicit source by id (must be active), or the first active
/// source when no id is given.
pub async fn sync_one(
    pool: &SqlitePool,
    client: &reqwest::Client,
    config: &AppConfig,
    source_id: Option<&str>,
    events: Option<&UnboundedSender<SessionWritten>>,
) -> anyhow::Result<SyncStats> {
    let source = match source_id {
        Some(id) => db::sources::get_active_source(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("data source {} not found or not active", id))?,
        None => db::sources::first_active_source(pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no active data source found"))?,
    };
    sync_source(pool, client, config, &source, events).await
}

/// Fetch a source's session list and run the full pipeline over it.
///
/// Transport failure records the error on the source and returns it without
/// touching session data. On success the source's last_synced is stamped
/// unconditionally (row-level errors included) and its error state cleared.
pub async fn sync_source(
    pool: &SqlitePool,
    client: &reqwest::Client,
    config: &AppConfig,
    source: &ExternalSource,
    events: Option<&UnboundedSender<SessionWritten>>,
) -> anyhow::Result<SyncStats> {
    // Overrides are resolved fresh on every call so credential rotation
    // takes effect without a restart.
    let overrides = EnvOverrides::from_env();
    let timeout = overrides.resolve_timeout(source, config);
    let username = overrides.resolve_username(source);
    let password = overrides.resolve_password(source);
    let source_id = source.id.to_string();

    log::info!("syncing source '{}' from {}", source.name, source.api_url);

    let mut request = client
        .get(&source.api_url)
        .timeout(Duration::from_secs(timeout.max(0) as u64));
    if let Some(user) = &username {
        request = request.basic_auth(user, password.as_deref());
    }

    let body = match fetch_text(request).await {
        Ok(body) => body,
        Err(e) => {
            let msg = format!("error fetching {}: {}", source.api_url, e);
            log::error!("{}", msg);
            db::sources::record_sync_error(pool, &source_id, &truncate_chars(&msg, MAX_ERROR_LEN))
                .await?;
            return Err(anyhow::anyhow!(msg));
        }
    };

    let stats = ingest_csv(pool, client, &source_id, &body, timeout, events).await?;

    db::sources::mark_synced(pool, &source_id, &Utc::now().to_rfc3339()).await?;
    log::info!("sync of '{}' complete: {}", source.name, stats.summary());
    Ok(stats)
}

async fn fetch_text(request: reqwest::RequestBuilder) -> anyhow::Result<String> {
    let response = request.send().await?.error_for_status()?;
    Ok(response.text().await?)
}

/// Run the batch pipeline over a headerless CSV body: normalize each row,
/// upsert the session, and process its transcript if it references one.
/// A bad row never aborts the batch.
pub async fn ingest_csv(
    pool: &SqlitePool,
    client: &reqwest::Client,
    source_id: &str,
    body: &str,
    timeout: i64,
    events: Option<&UnboundedSender<SessionWritten>>,
) -> anyhow::Result<SyncStats> {
    let mut stats = SyncStats::default();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::error!("unreadable CSV row: {}", e);
                stats.errors.push(RowError {
                    session_id: String::new(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let row: Vec<String> = record.iter().map(str::to_string).collect();
        let session = match normalize_row(&row) {
            Ok(s) => s,
            Err(e) => {
                log::error!("skipping row: {}", e);
                stats.errors.push(e);
                continue;
            }
        };

        let start_rfc = session.start_time.to_rfc3339();
        let end_rfc = session.end_time.to_rfc3339();
        let params = session_params(&session, &start_rfc, &end_rfc);
        let (session_pk, created) =
            match db::sessions::upsert_session(pool, source_id, &params).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("error storing session {}: {}", session.session_id, e);
                    stats.errors.push(RowError {
                        session_id: session.session_id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
        if created {
            stats.sessions_created += 1;
            log::info!("created session {}", session.session_id);
        } else {
            stats.sessions_updated += 1;
            log::info!("updated session {}", session.session_id);
        }

        // Transcript failures are isolated: the session row stays, only
        // its messages are skipped.
        if let Some(url) = &session.transcript_url {
            match process_transcript(pool, client, &session_pk, url, timeout).await {
                Ok(count) => {
                    stats.transcripts_processed += 1;
                    stats.messages_created += count;
                }
                Err(e) => {
                    log::error!(
                        "error processing transcript for session {}: {}",
                        session.session_id,
                        e
                    );
                }
            }
        }

        if let Some(tx) = events {
            let _ = tx.send(SessionWritten {
                source_id: source_id.to_string(),
                session_id: session.session_id.clone(),
            });
        }
    }

    Ok(stats)
}

/// Fetch a session's transcript, segment it, sanitize each message body and
/// replace the stored message set. Returns the number of messages written.
async fn process_transcript(
    pool: &SqlitePool,
    client: &reqwest::Client,
    session_pk: &str,
    url: &str,
    timeout: i64,
) -> anyhow::Result<u32> {
    let request = client
        .get(url)
        .timeout(Duration::from_secs(timeout.max(0) as u64));
    let transcript = fetch_text(request).await?;

    if transcript.trim().is_empty() {
        log::warn!("empty transcript at {}", url);
        return db::messages::replace_messages(pool, session_pk, &[]).await;
    }

    let segmentation = segment_transcript(&transcript);
    log::debug!(
        "segmented transcript via {:?} into {} messages",
        segmentation.strategy,
        segmentation.messages.len()
    );

    let messages: Vec<MessageParams> = segmentation
        .messages
        .into_iter()
        .map(|m| MessageParams {
            sender: m.sender.as_str().to_string(),
            safe_html: sanitize_html(&m.text),
            message: m.text,
        })
        .collect();

    db::messages::replace_messages(pool, session_pk, &messages).await
}

fn session_params<'a>(
    session: &'a NormalizedSession,
    start_rfc: &'a str,
    end_rfc: &'a str,
) -> SessionParams<'a> {
    SessionParams {
        session_id: &session.session_id,
        start_time: start_rfc,
        end_time: end_rfc,
        ip_address: session.ip_address.as_deref(),
        country: session.country.as_deref(),
        language: session.language.as_deref(),
        messages_sent: session.messages_sent,
        sentiment: session.sentiment.as_deref(),
        escalated: session.escalated,
        forwarded_hr: session.forwarded_hr,
        transcript_url: session.transcript_url.as_deref(),
        avg_response_time: session.avg_response_time,
        tokens: session.tokens,
        tokens_eur: session.tokens_eur,
        category: session.category.as_deref(),
        initial_msg: session.initial_msg.as_deref(),
        user_rating: session.user_rating,
    }
}

/// Periodic mode: sync every active source, reporting a per-source
/// breakdown. Only when every source fails does the whole run fail, so an
/// outer retry policy can re-attempt it.
pub async fn sync_all_sources(
    pool: &SqlitePool,
    client: &reqwest::Client,
    config: &AppConfig,
    events: Option<&UnboundedSender<SessionWritten>>,
) -> anyhow::Result<SyncSummary> {
    let sources = db::sources::list_active_sources(pool).await?;
    if sources.is_empty() {
        log::warn!("no active external data sources found, skipping fetch");
        return Ok(SyncSummary::default());
    }

    let mut summary = SyncSummary::default();
    for source in &sources {
        match sync_source(pool, client, config, source, events).await {
            Ok(stats) => summary.succeeded.push((source.name.clone(), stats)),
            Err(e) => {
                log::error!("error syncing source {}: {}", source.name, e);
                summary.failed.push((source.name.clone(), e.to_string()));
            }
        }
    }

    if !summary.failed.is_empty() && summary.succeeded.is_empty() {
        let names: Vec<&str> = summary.failed.iter().map(|(n, _)| n.as_str()).collect();
        anyhow::bail!("all data sources failed: {}", names.join(", "));
    }

    log::info!("periodic sync complete: {}", summary.summary());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::sources::CreateSourceParams;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn test_source(pool: &SqlitePool) -> String {
        db::sources::create_source(
            pool,
            &CreateSourceParams {
                name: "test source",
                api_url: "https://example.com/chats",
                auth_username: None,
                auth_password: None,
                sync_interval: 3600,
                timeout: 30,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn batch_continues_past_bad_row() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();

        let body = "\
s1,2025-05-01 10:00:00,2025-05-01 10:05:00
s2,2025-05-01 11:00:00,2025-05-01 11:05:00
s3,not-a-date,also-bad
s4,2025-05-01 12:00:00,2025-05-01 12:05:00
s5,2025-05-01 13:00:00,2025-05-01 13:05:00
";
        let stats = ingest_csv(&pool, &client, &source_id, body, 30, None)
            .await
            .unwrap();
        assert_eq!(stats.sessions_created, 4);
        assert_eq!(stats.error_count(), 1);
        assert_eq!(stats.errors[0].session_id, "s3");
        assert_eq!(
            db::sessions::count_sessions(&pool, &source_id).await.unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn resync_updates_instead_of_duplicating() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();

        let body = "s1,2025-05-01 10:00:00,2025-05-01 10:05:00,1.2.3.4,NL\n\
                    s2,2025-05-01 11:00:00,2025-05-01 11:05:00,5.6.7.8,DE\n";
        let first = ingest_csv(&pool, &client, &source_id, body, 30, None)
            .await
            .unwrap();
        assert_eq!(first.sessions_created, 2);
        assert_eq!(first.sessions_updated, 0);

        let second = ingest_csv(&pool, &client, &source_id, body, 30, None)
            .await
            .unwrap();
        assert_eq!(second.sessions_created, 0);
        assert_eq!(second.sessions_updated, 2);
        assert_eq!(
            db::sessions::count_sessions(&pool, &source_id).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn short_and_empty_rows_do_not_error() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();

        let body = "s1,2025-05-01 10:00:00,2025-05-01 10:05:00\n\n";
        let stats = ingest_csv(&pool, &client, &source_id, body, 30, None)
            .await
            .unwrap();
        assert_eq!(stats.sessions_created, 1);
        assert_eq!(stats.error_count(), 0);

        let session = db::sessions::get_session(&pool, &source_id, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.country, None);
        assert_eq!(session.escalated, None);
    }

    #[tokio::test]
    async fn write_path_publishes_session_events() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let body = "s1,2025-05-01 10:00:00,2025-05-01 10:05:00\n";
        ingest_csv(&pool, &client, &source_id, body, 30, Some(&tx))
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.source_id, source_id);
        assert_eq!(event.session_id, "s1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_state_accumulates_then_resets_on_success() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;

        let long_error = format!("error fetching https://example.com/chats: {}", "x".repeat(400));
        let truncated = truncate_chars(&long_error, MAX_ERROR_LEN);
        db::sources::record_sync_error(&pool, &source_id, &truncated)
            .await
            .unwrap();
        db::sources::record_sync_error(&pool, &source_id, &truncated)
            .await
            .unwrap();

        let source = db::sources::get_active_source(&pool, &source_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.error_count, 2);
        assert_eq!(
            source.last_error.as_ref().unwrap().chars().count(),
            MAX_ERROR_LEN
        );

        db::sources::mark_synced(&pool, &source_id, "2025-05-01T10:00:00+00:00")
            .await
            .unwrap();
        let source = db::sources::get_active_source(&pool, &source_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.error_count, 0);
        assert_eq!(source.last_error, None);
        assert_eq!(source.last_synced.as_deref(), Some("2025-05-01T10:00:00+00:00"));
        assert_eq!(source.status(), "Active");
    }

    #[tokio::test]
    async fn unreachable_transcript_keeps_session_row() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();

        // Port 1 refuses connections, so the transcript fetch fails after
        // the session upsert has already landed.
        let body = "s1,2025-05-01 10:00:00,2025-05-01 10:05:00,,,,,,,,http://127.0.0.1:1/t.txt\n";
        let stats = ingest_csv(&pool, &client, &source_id, body, 2, None)
            .await
            .unwrap();
        assert_eq!(stats.sessions_created, 1);
        assert_eq!(stats.transcripts_processed, 0);
        assert_eq!(stats.messages_created, 0);
        assert_eq!(stats.error_count(), 0);

        let session = db::sessions::get_session(&pool, &source_id, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            session.transcript_url.as_deref(),
            Some("http://127.0.0.1:1/t.txt")
        );
        assert_eq!(
            db::messages::count_messages(&pool, &session.id.to_string())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn message_rebuild_replaces_not_appends() {
        let pool = test_pool().await;
        let source_id = test_source(&pool).await;
        let client = reqwest::Client::new();

        let body = "s1,2025-05-01 10:00:00,2025-05-01 10:05:00\n";
        ingest_csv(&pool, &client, &source_id, body, 30, None)
            .await
            .unwrap();
        let session = db::sessions::get_session(&pool, &source_id, "s1")
            .await
            .unwrap()
            .unwrap();
        let session_pk = session.id.to_string();

        let first: Vec<MessageParams> = segment_transcript("User: hi\nAssistant: hello\nUser: bye")
            .messages
            .into_iter()
            .map(|m| MessageParams {
                sender: m.sender.as_str().to_string(),
                safe_html: sanitize_html(&m.text),
                message: m.text,
            })
            .collect();
        db::messages::replace_messages(&pool, &session_pk, &first)
            .await
            .unwrap();
        assert_eq!(
            db::messages::count_messages(&pool, &session_pk).await.unwrap(),
            3
        );

        let second = vec![MessageParams {
            sender: "User".to_string(),
            message: "only message now".to_string(),
            safe_html: "only message now".to_string(),
        }];
        db::messages::replace_messages(&pool, &session_pk, &second)
            .await
            .unwrap();

        let stored = db::messages::list_messages(&pool, &session_pk).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "only message now");
        assert_eq!(stored[0].seq, 0);
    }
}
