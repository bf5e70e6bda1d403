use sqlx::sqlite::SqlitePool;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use common::models::ChatSession;
use db::dashboard::DashboardSessionParams;

/// Event published by the sync write path whenever a canonical session is
/// created or updated. The reconciliation subscriber mirrors the session
/// into every dashboard data source linked to its external source, making
/// the fan-out explicit instead of a hidden save-time side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionWritten {
    pub source_id: String,
    pub session_id: String,
}

#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub synced: u32,
    pub errors: u32,
}

impl ReconcileStats {
    pub fn summary(&self) -> String {
        format!("{} sessions synced, {} errors", self.synced, self.errors)
    }
}

/// Null substitutions for the dashboard schema: empty string for text,
/// false for booleans, zero for counters, rating rendered as a string.
fn mirror_params<'a>(session: &'a ChatSession, rating: &'a str) -> DashboardSessionParams<'a> {
    DashboardSessionParams {
        session_id: &session.session_id,
        start_time: &session.start_time,
        end_time: &session.end_time,
        ip_address: session.ip_address.as_deref(),
        country: session.country.as_deref().unwrap_or(""),
        language: session.language.as_deref().unwrap_or(""),
        messages_sent: session.messages_sent.unwrap_or(0),
        sentiment: session.sentiment.as_deref().unwrap_or(""),
        escalated: session.escalated.unwrap_or(false),
        forwarded_hr: session.forwarded_hr.unwrap_or(false),
        transcript_url: session.transcript_url.as_deref().unwrap_or(""),
        avg_response_time: session.avg_response_time,
        tokens: session.tokens.unwrap_or(0),
        tokens_eur: session.tokens_eur,
        category: session.category.as_deref().unwrap_or(""),
        initial_msg: session.initial_msg.as_deref().unwrap_or(""),
        user_rating: rating,
    }
}

fn rating_string(session: &ChatSession) -> String {
    session
        .user_rating
        .map(|r| r.to_string())
        .unwrap_or_default()
}

/// Mirror every session of each linked external source into the dashboard
/// storage. Pure upsert keyed by (data_source_id, session_id): safe to run
/// repeatedly. `clear` wipes each data source's mirror first.
pub async fn reconcile_source(
    pool: &SqlitePool,
    external_source_id: Option<&str>,
    clear: bool,
) -> anyhow::Result<ReconcileStats> {
    let data_sources = db::dashboard::list_linked_data_sources(pool, external_source_id).await?;
    if data_sources.is_empty() {
        log::warn!("no dashboard data sources with external sources found");
        return Ok(ReconcileStats::default());
    }

    let mut stats = ReconcileStats::default();
    for data_source in &data_sources {
        let ext_id = match data_source.external_source_id.as_deref() {
            Some(id) => id,
            None => continue,
        };
        let data_source_id = data_source.id.to_string();

        if clear {
            db::dashboard::clear_dashboard_sessions(pool, &data_source_id).await?;
        }

        let sessions = db::sessions::list_sessions_for_source(pool, ext_id).await?;
        log::info!(
            "reconciling {} sessions into data source '{}'",
            sessions.len(),
            data_source.name
        );

        for session in &sessions {
            let rating = rating_string(session);
            match db::dashboard::upsert_dashboard_session(
                pool,
                &data_source_id,
                &mirror_params(session, &rating),
            )
            .await
            {
                Ok(_) => stats.synced += 1,
                Err(e) => {
                    log::error!(
                        "error syncing session {} to data source {}: {}",
                        session.session_id,
                        data_source.name,
                        e
                    );
                    stats.errors += 1;
                }
            }
        }
    }

    log::info!("reconciliation complete: {}", stats.summary());
    Ok(stats)
}

/// Fan one session out to every dashboard data source linked to its
/// external source. Returns the number of mirrors written.
pub async fn reconcile_session(pool: &SqlitePool, session: &ChatSession) -> anyhow::Result<u32> {
    let source_id = session.source_id.to_string();
    let data_sources = db::dashboard::list_linked_data_sources(pool, Some(&source_id)).await?;
    if data_sources.is_empty() {
        log::warn!(
            "no dashboard data sources linked for session {}",
            session.session_id
        );
        return Ok(0);
    }

    let rating = rating_string(session);
    let mut written = 0;
    for data_source in &data_sources {
        db::dashboard::upsert_dashboard_session(
            pool,
            &data_source.id.to_string(),
            &mirror_params(session, &rating),
        )
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Subscriber half of the per-write fan-out: consumes SessionWritten events
/// until the channel closes. Errors are logged and absorbed so a bad event
/// never kills the subscriber.
pub fn spawn_reconciler(
    pool: SqlitePool,
    mut rx: UnboundedReceiver<SessionWritten>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let session =
                match db::sessions::get_session(&pool, &event.source_id, &event.session_id).await {
                    Ok(Some(session)) => session,
                    Ok(None) => {
                        log::warn!("session {} vanished before reconcile", event.session_id);
                        continue;
                    }
                    Err(e) => {
                        log::error!("error loading session {}: {}", event.session_id, e);
                        continue;
                    }
                };
            if let Err(e) = reconcile_session(&pool, &session).await {
                log::error!("error reconciling session {}: {}", event.session_id, e);
            }
        }
    })
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

    async fn seed_source_with_sessions(pool: &SqlitePool, n: usize) -> String {
        let source_id = db::sources::create_source(
            pool,
            &CreateSourceParams {
                name: "ext",
                api_url: "https://example.com/chats",
                auth_username: None,
                auth_password: None,
                sync_interval: 3600,
                timeout: 30,
            },
        )
        .await
        .unwrap();

        let client = reqwest::Client::new();
        let mut body = String::new();
        for i in 0..n {
            body.push_str(&format!(
                "s{},2025-05-01 10:00:00,2025-05-01 10:05:00,,NL,nl,3,positive,true,,,,,,billing,hi,4\n",
                i
            ));
        }
        crate::sync::ingest_csv(pool, &client, &source_id, &body, 30, None)
            .await
            .unwrap();
        source_id
    }

    #[tokio::test]
    async fn reconcile_twice_does_not_duplicate() {
        let pool = test_pool().await;
        let source_id = seed_source_with_sessions(&pool, 10).await;
        let ds_id = db::dashboard::create_data_source(&pool, "dash", "acme", Some(&source_id))
            .await
            .unwrap();

        let first = reconcile_source(&pool, None, false).await.unwrap();
        assert_eq!(first.synced, 10);
        let second = reconcile_source(&pool, None, false).await.unwrap();
        assert_eq!(second.synced, 10);

        assert_eq!(
            db::dashboard::count_dashboard_sessions(&pool, &ds_id)
                .await
                .unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn mirror_substitutes_nulls() {
        let pool = test_pool().await;
        let source_id = seed_source_with_sessions(&pool, 0).await;
        let ds_id = db::dashboard::create_data_source(&pool, "dash", "acme", Some(&source_id))
            .await
            .unwrap();

        // Minimal row: everything past the dates is unset.
        let client = reqwest::Client::new();
        crate::sync::ingest_csv(
            &pool,
            &client,
            &source_id,
            "bare,2025-05-01 10:00:00,2025-05-01 10:05:00\n",
            30,
            None,
        )
        .await
        .unwrap();

        reconcile_source(&pool, Some(&source_id), false).await.unwrap();

        let (country, escalated, tokens, rating): (String, bool, i64, String) = sqlx::query_as(
            "SELECT country, escalated, tokens, user_rating FROM dashboard_sessions \
             WHERE data_source_id = ? AND session_id = 'bare'",
        )
        .bind(&ds_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(country, "");
        assert!(!escalated);
        assert_eq!(tokens, 0);
        assert_eq!(rating, "");
    }

    #[tokio::test]
    async fn session_fans_out_to_all_linked_data_sources() {
        let pool = test_pool().await;
        let source_id = seed_source_with_sessions(&pool, 1).await;
        let ds_a = db::dashboard::create_data_source(&pool, "dash-a", "acme", Some(&source_id))
            .await
            .unwrap();
        let ds_b = db::dashboard::create_data_source(&pool, "dash-b", "acme", Some(&source_id))
            .await
            .unwrap();

        let session = db::sessions::get_session(&pool, &source_id, "s0")
            .await
            .unwrap()
            .unwrap();
        let written = reconcile_session(&pool, &session).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            db::dashboard::count_dashboard_sessions(&pool, &ds_a).await.unwrap(),
            1
        );
        assert_eq!(
            db::dashboard::count_dashboard_sessions(&pool, &ds_b).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn subscriber_consumes_write_events() {
        let pool = test_pool().await;
        let source_id = seed_source_with_sessions(&pool, 1).await;
        let ds_id = db::dashboard::create_data_source(&pool, "dash", "acme", Some(&source_id))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_reconciler(pool.clone(), rx);
        tx.send(SessionWritten {
            source_id: source_id.clone(),
            session_id: "s0".to_string(),
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            db::dashboard::count_dashboard_sessions(&pool, &ds_id).await.unwrap(),
            1
        );
    }
}
