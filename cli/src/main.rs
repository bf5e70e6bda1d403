use std::time::Duration;

use clap::{Parser, Subcommand};

use common::config::{AppConfig, EnvOverrides};
use db::sources::CreateSourceParams;
use ingest::reconcile::{reconcile_source, spawn_reconciler};
use ingest::sync::{sync_all_sources, sync_one};
use ingest::task::{run_with_retry, RetryPolicy};

#[derive(Parser)]
#[command(name = "chat-data-sync")]
pub struct Args {
    #[arg(long, default_value = "dashboard.db")]
    pub db: String,

    /// Optional TOML config file with application defaults.
    #[arg(long, default_value = "chat-data-sync.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sync one external source (the first active one if no id is given).
    Sync {
        #[arg(long)]
        source_id: Option<String>,
    },
    /// Sync every active external source once.
    SyncAll,
    /// Run the periodic sync loop with retry and a soft time limit.
    Watch {
        /// Seconds between runs; defaults to the env/config interval.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Mirror external sessions into dashboard storage.
    Reconcile {
        /// Limit to dashboard sources linked to this external source.
        #[arg(long)]
        source_id: Option<String>,
        /// Clear existing dashboard sessions before mirroring.
        #[arg(long)]
        clear: bool,
    },
    /// Register a new external source.
    AddSource {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value = "3600")]
        sync_interval: i64,
        #[arg(long, default_value = "300")]
        timeout: i64,
    },
    /// List configured external sources and their sync status.
    ListSources,
    /// Register a dashboard data source, optionally linked to an external source.
    AddDashboardSource {
        #[arg(long)]
        name: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        external_source_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    let pool = db::init_pool(&args.db).await?;
    let client = reqwest::Client::builder().build()?;

    match args.command {
        Command::Sync { source_id } => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let reconciler = spawn_reconciler(pool.clone(), rx);
            let result = sync_one(&pool, &client, &config, source_id.as_deref(), Some(&tx)).await;
            drop(tx);
            reconciler.await?;
            let stats = result?;
            println!("Sync complete: {}", stats.summary());
            for error in &stats.errors {
                println!("  error: {}", error);
            }
        }
        Command::SyncAll => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let reconciler = spawn_reconciler(pool.clone(), rx);
            let result = sync_all_sources(&pool, &client, &config, Some(&tx)).await;
            drop(tx);
            reconciler.await?;
            let summary = result?;
            println!("Sync complete: {}", summary.summary());
            for (name, stats) in &summary.succeeded {
                println!("  {}: {}", name, stats.summary());
            }
            for (name, error) in &summary.failed {
                println!("  {}: failed: {}", name, error);
            }
        }
        Command::Watch { interval } => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let _reconciler = spawn_reconciler(pool.clone(), rx);
            loop {
                // Re-read overrides every run so rotated timeout/interval
                // settings take effect without a restart.
                let overrides = EnvOverrides::from_env();
                let policy = RetryPolicy::for_timeout(
                    overrides.timeout.unwrap_or(config.default_timeout),
                );
                let interval = interval.unwrap_or_else(|| {
                    overrides
                        .sync_interval
                        .unwrap_or(config.default_sync_interval)
                        .max(1) as u64
                });
                match run_with_retry("periodic sync", &policy, || {
                    sync_all_sources(&pool, &client, &config, Some(&tx))
                })
                .await
                {
                    Ok(summary) => log::info!("run finished: {}", summary.summary()),
                    Err(e) => log::error!("run failed after retries: {}", e),
                }
                log::info!("next run in {}s", interval);
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }
        Command::Reconcile { source_id, clear } => {
            let stats = reconcile_source(&pool, source_id.as_deref(), clear).await?;
            println!("Reconcile complete: {}", stats.summary());
        }
        Command::AddSource {
            name,
            url,
            username,
            password,
            sync_interval,
            timeout,
        } => {
            let id = db::sources::create_source(
                &pool,
                &CreateSourceParams {
                    name: &name,
                    api_url: &url,
                    auth_username: username.as_deref(),
                    auth_password: password.as_deref(),
                    sync_interval,
                    timeout,
                },
            )
            .await?;
            println!("Created external source {} ({})", name, id);
        }
        Command::ListSources => {
            let sources = db::sources::list_sources(&pool).await?;
            if sources.is_empty() {
                println!("No external sources configured.");
            }
            for source in sources {
                println!(
                    "{}  {}  {}  last_synced={}  {}",
                    source.id,
                    source.name,
                    source.api_url,
                    source.last_synced.as_deref().unwrap_or("never"),
                    source.status()
                );
                if let Some(error) = &source.last_error {
                    println!("    last error: {}", error);
                }
            }
        }
        Command::AddDashboardSource {
            name,
            company,
            external_source_id,
        } => {
            let id = db::dashboard::create_data_source(
                &pool,
                &name,
                &company,
                external_source_id.as_deref(),
            )
            .await?;
            println!("Created dashboard data source {} ({})", name, id);
        }
    }

    Ok(())
}
