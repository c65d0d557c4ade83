use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ereddicator::config::Config;
use ereddicator::db::{self, Database};
use ereddicator::scrubber::{Pipeline, RecordStatus};
use ereddicator::source::RedditClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting ereddicator");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            if let Some(help) = e.help() {
                eprintln!("{help}");
            }
            return Err(e).context("Failed to load configuration");
        }
    };
    config.validate().context("Invalid configuration")?;

    info!(
        username = %config.credentials.username,
        posts = config.include_posts,
        comments = config.include_comments,
        dry_run = config.dry_run,
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    let client = RedditClient::login(&config)
        .await
        .context("Failed to log in to Reddit")?;

    info!(username = %client.username(), "Logged in");

    let pipeline = Pipeline::new(&config, db.clone(), Arc::new(client))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing in-flight items");
        signal_cancel.cancel();
    });

    let summary = pipeline.run(cancel).await?;
    summary.log();

    if !config.dry_run {
        report_run_records(&db, summary.run_id).await?;
    }

    Ok(())
}

/// Log the stored totals for a run and every item that was not scrubbed.
async fn report_run_records(database: &Database, run_id: i64) -> Result<()> {
    let pool = database.pool();
    let scrubbed = db::count_records(pool, run_id, RecordStatus::Scrubbed).await?;
    let skipped = db::count_records(pool, run_id, RecordStatus::Skipped).await?;
    let failed = db::count_records(pool, run_id, RecordStatus::Failed).await?;
    info!(run_id, scrubbed, skipped, failed, "Stored run totals");

    for row in db::get_unsuccessful_records(pool, run_id).await? {
        info!(
            item_id = %row.item_id,
            status = %row.status,
            reason = row.reason.as_deref().unwrap_or("-"),
            detail = row.detail.as_deref().unwrap_or(""),
            content_destroyed = row.content_destroyed,
            "Not scrubbed"
        );
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ereddicator=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
