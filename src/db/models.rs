use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scrubber::{Outcome, ProcessingRecord};
use crate::source::{Cursor, ItemKind};

/// A scrub run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Run {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// Stored cursor for one content kind.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CursorRow {
    pub run_id: i64,
    pub kind: String,
    pub after_token: Option<String>,
    pub exhausted: bool,
    pub updated_at: String,
}

impl CursorRow {
    /// Convert to a [`Cursor`]; `None` if the kind is unknown.
    #[must_use]
    pub fn into_cursor(self) -> Option<Cursor> {
        Some(Cursor {
            kind: ItemKind::from_str(&self.kind)?,
            after: self.after_token,
            exhausted: self.exhausted,
        })
    }
}

/// Stored outcome for one item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecordRow {
    pub run_id: i64,
    pub item_id: String,
    pub kind: String,
    pub status: String,
    pub reason: Option<String>,
    pub verified: bool,
    pub content_destroyed: bool,
    pub detail: Option<String>,
    pub recorded_at: String,
}

impl RecordRow {
    /// Convert to a [`ProcessingRecord`]; `None` if the row does not parse.
    #[must_use]
    pub fn into_record(self) -> Option<ProcessingRecord> {
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()?;
        Some(ProcessingRecord {
            kind: ItemKind::from_str(&self.kind)?,
            outcome: Outcome::parse(&self.status, self.reason.as_deref())?,
            item_id: self.item_id,
            verified: self.verified,
            content_destroyed: self.content_destroyed,
            detail: self.detail,
            recorded_at,
        })
    }
}
