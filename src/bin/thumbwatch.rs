//! CLI binary for thumbwatch.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use thumbwatch::scheduler::JobHandler;
use thumbwatch::{
    CycleReport, EntityId, FsObjectStore, JsonFileEntityStore, LocalScheduler, Monitor,
    MonitorConfig, Registrar,
};
use thumbwatch_fetch::{HttpFetcher, OembedClient};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// thumbwatch: keep play-button thumbnails in sync with their videos.
#[derive(Parser)]
#[command(name = "thumbwatch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until Ctrl-C.
    Serve,

    /// Start monitoring a video URL.
    Add {
        /// Watch, short-link or embed URL.
        url: String,
    },

    /// Run one monitoring cycle immediately.
    Check {
        /// Entity id.
        entity_id: String,
    },

    /// Show the schedule state of every entity.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Re-arm every entity at now + its current interval.
    RescheduleAll,

    /// Stop monitoring an entity and delete it.
    Retire {
        /// Entity id.
        entity_id: String,
    },
}

struct App {
    monitor: Arc<Monitor>,
    scheduler: Arc<LocalScheduler>,
    config: MonitorConfig,
}

impl App {
    async fn open(config: MonitorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(JsonFileEntityStore::open(&config.storage.entity_file).await?);
        let scheduler = Arc::new(
            LocalScheduler::open(&config.scheduler.state_file)?
                .with_tick_interval(std::time::Duration::from_secs(config.scheduler.tick_secs)),
        );
        let objects = Arc::new(FsObjectStore::new(
            &config.storage.object_dir,
            config.storage.public_base_url.clone(),
        ));
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);

        let monitor = Monitor::new(store, scheduler.clone(), objects, fetcher)
            .with_decorator(thumbwatch::Decorator::new(config.decorator.clone()))
            .with_policy(config.policy);

        Ok(Self {
            monitor: Arc::new(monitor),
            scheduler,
            config,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("thumbwatch=info,thumbwatch_fetch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(MonitorConfig::default_config_path);
    let config = MonitorConfig::load_or_default(&config_path)
        .with_context(|| format!("cannot load config from {}", config_path.display()))?;
    let app = App::open(config).await?;

    match cli.command {
        Command::Serve => serve(app).await,
        Command::Add { url } => add(app, &url).await,
        Command::Check { entity_id } => check(app, entity_id).await,
        Command::Status { json } => status(app, json).await,
        Command::RescheduleAll => reschedule_all(app).await,
        Command::Retire { entity_id } => retire(app, entity_id).await,
    }
}

async fn serve(app: App) -> anyhow::Result<()> {
    println!("thumbwatch v{}", env!("CARGO_PKG_VERSION"));
    let cancel = CancellationToken::new();
    let handler: Arc<dyn JobHandler> = app.monitor.clone();
    let handle = Arc::clone(&app.scheduler).run(handler, cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    info!("shutting down");
    cancel.cancel();
    handle.await?;
    Ok(())
}

async fn add(app: App, url: &str) -> anyhow::Result<()> {
    let lookup = Arc::new(OembedClient::new(&app.config.fetch)?);
    let registrar = Registrar::new(app.monitor, lookup)
        .with_sources(app.config.source.clone())
        .with_initial_delay_days(app.config.scheduler.initial_delay_days);

    let registration = registrar.register(url).await?;
    if registration.created {
        println!("Registered {}", registration.entity.id);
    } else {
        println!("Already monitored as {}", registration.entity.id);
    }
    println!("{}", registration.markdown);
    Ok(())
}

async fn check(app: App, entity_id: String) -> anyhow::Result<()> {
    let id = EntityId::from(entity_id);
    match app.monitor.run_cycle(&id).await? {
        CycleReport::EntityMissing => anyhow::bail!("no entity with id {id}"),
        CycleReport::Completed(summary) => {
            println!(
                "{}: {} (interval {} -> {} days, next check {})",
                id,
                summary.verdict,
                summary.previous_interval_days,
                summary.next_interval_days,
                summary.fire_at.format("%Y-%m-%d %H:%M UTC"),
            );
            if let Some(error) = summary.error {
                println!("  error: {error}");
            }
        }
    }
    Ok(())
}

async fn status(app: App, json: bool) -> anyhow::Result<()> {
    let rows = app.monitor.schedule_status(Utc::now()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No monitored videos.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<12}  {:>8}  {:<17}  {:<4}  TITLE",
        "ID", "VIDEO", "INTERVAL", "NEXT CHECK", "TASK"
    );
    for row in rows {
        let next = row.next_check_at.map_or_else(
            || "-".to_owned(),
            |at| at.format("%Y-%m-%d %H:%M").to_string(),
        );
        let marker = if row.overdue { "!" } else { "" };
        println!(
            "{:<36}  {:<12}  {:>7}d  {:<17}  {:<4}  {}{}",
            row.id,
            row.external_key,
            row.check_interval_days,
            format!("{next}{marker}"),
            if row.has_scheduled_task { "yes" } else { "no" },
            row.title,
            row.last_error
                .map(|e| format!("  (last error: {e})"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn reschedule_all(app: App) -> anyhow::Result<()> {
    let summary = app.monitor.reschedule_all(Utc::now()).await?;
    println!(
        "Rescheduled {} entities ({} errors)",
        summary.rescheduled, summary.errors
    );
    Ok(())
}

async fn retire(app: App, entity_id: String) -> anyhow::Result<()> {
    let id = EntityId::from(entity_id);
    if app.monitor.retire(&id).await? {
        println!("Retired {id}");
    } else {
        anyhow::bail!("no entity with id {id}");
    }
    Ok(())
}
