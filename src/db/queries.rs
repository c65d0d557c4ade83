use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::warn;

use super::models::{CursorRow, RecordRow, Run};
use crate::scrubber::{ProcessingRecord, RecordStatus, RunState};
use crate::source::Cursor;

// ========== Runs ==========

/// Get the most recent run that has not completed.
pub async fn get_active_run(pool: &SqlitePool) -> Result<Option<Run>> {
    sqlx::query_as(
        "SELECT * FROM runs WHERE completed_at IS NULL ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .context("Failed to fetch active run")
}

/// Start a new run, returning its ID.
pub async fn create_run(pool: &SqlitePool) -> Result<i64> {
    let result = sqlx::query("INSERT INTO runs DEFAULT VALUES")
        .execute(pool)
        .await
        .context("Failed to create run")?;

    Ok(result.last_insert_rowid())
}

/// Mark a run as completed so the next invocation starts fresh.
pub async fn complete_run(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE runs SET completed_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete run")?;

    Ok(())
}

// ========== Run state ==========

/// Load everything recorded for a run.
pub async fn load_run_state(pool: &SqlitePool, run_id: i64) -> Result<RunState> {
    let cursors: Vec<CursorRow> = sqlx::query_as("SELECT * FROM run_cursors WHERE run_id = ?")
        .bind(run_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch run cursors")?;

    let records: Vec<RecordRow> = sqlx::query_as("SELECT * FROM run_records WHERE run_id = ?")
        .bind(run_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch run records")?;

    let mut state = RunState::new(run_id);
    for row in cursors {
        let kind = row.kind.clone();
        match row.into_cursor() {
            Some(cursor) => {
                state.cursors.insert(cursor.kind, cursor);
            }
            None => warn!(run_id, kind = %kind, "Ignoring cursor with unknown kind"),
        }
    }
    for row in records {
        let item_id = row.item_id.clone();
        match row.into_record() {
            Some(record) => {
                state.records.insert(record.item_id.clone(), record);
            }
            None => warn!(run_id, item_id = %item_id, "Ignoring unreadable record"),
        }
    }

    Ok(state)
}

/// Resume the active run, or start a new one if there is none.
pub async fn resume_or_create_run(pool: &SqlitePool) -> Result<RunState> {
    if let Some(run) = get_active_run(pool).await? {
        return load_run_state(pool, run.id).await;
    }
    let id = create_run(pool).await?;
    Ok(RunState::new(id))
}

/// Persist a batch of outcomes and, optionally, the cursor they complete.
///
/// Everything is written in one transaction so a crash leaves either the
/// previous or the new state, never a mix.
pub async fn commit_page(
    pool: &SqlitePool,
    run_id: i64,
    records: &[ProcessingRecord],
    cursor: Option<&Cursor>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin page transaction")?;

    for record in records {
        sqlx::query(
            r"
            INSERT OR IGNORE INTO run_records
                (run_id, item_id, kind, status, reason, verified, content_destroyed, detail, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(run_id)
        .bind(&record.item_id)
        .bind(record.kind.as_str())
        .bind(record.status().as_str())
        .bind(record.outcome.reason())
        .bind(record.verified)
        .bind(record.content_destroyed)
        .bind(&record.detail)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to insert run record")?;
    }

    if let Some(cursor) = cursor {
        sqlx::query(
            r"
            INSERT INTO run_cursors (run_id, kind, after_token, exhausted, updated_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(run_id, kind) DO UPDATE SET
                after_token = excluded.after_token,
                exhausted = excluded.exhausted,
                updated_at = excluded.updated_at
            ",
        )
        .bind(run_id)
        .bind(cursor.kind.as_str())
        .bind(&cursor.after)
        .bind(cursor.exhausted)
        .execute(&mut *tx)
        .await
        .context("Failed to store cursor")?;
    }

    tx.commit().await.context("Failed to commit page")?;

    Ok(())
}

/// Count a run's records with the given status.
pub async fn count_records(pool: &SqlitePool, run_id: i64, status: RecordStatus) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM run_records WHERE run_id = ? AND status = ?")
            .bind(run_id)
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .context("Failed to count run records")?;

    Ok(count)
}

/// List a run's skipped and failed records for inspection.
pub async fn get_unsuccessful_records(pool: &SqlitePool, run_id: i64) -> Result<Vec<RecordRow>> {
    sqlx::query_as(
        r"
        SELECT * FROM run_records
        WHERE run_id = ? AND status != 'scrubbed'
        ORDER BY recorded_at
        ",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch unsuccessful records")
}
