use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating run state schema");

    // One row per scrub run; completed runs are kept as an archive.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL DEFAULT (datetime('now')),
            completed_at TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create runs table")?;

    // Last fully drained cursor per content kind
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS run_cursors (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            after_token TEXT,
            exhausted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (run_id, kind)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create run_cursors table")?;

    // Per-item outcomes; never holds item text
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS run_records (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            item_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            verified INTEGER NOT NULL DEFAULT 0,
            content_destroyed INTEGER NOT NULL DEFAULT 0,
            detail TEXT,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (run_id, item_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create run_records table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_records_status ON run_records(run_id, status)")
        .execute(pool)
        .await
        .context("Failed to create run_records status index")?;

    Ok(())
}
