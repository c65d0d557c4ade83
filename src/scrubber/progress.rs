//! Per-item outcomes and the resumable run state built from them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{Cursor, Item, ItemKind, PermanentKind};

/// Final status of one item within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Scrubbed,
    Skipped,
    Failed,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrubbed => "scrubbed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scrubbed" => Some(Self::Scrubbed),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Why an item was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    Duplicate,
    AlreadyGone,
    Excluded,
    KindDisabled,
    OutOfRange,
    Locked,
    NotEditable,
    NotFound,
    Forbidden,
    Archived,
    DryRun,
}

impl SkipReason {
    const ALL: [SkipReason; 11] = [
        Self::Duplicate,
        Self::AlreadyGone,
        Self::Excluded,
        Self::KindDisabled,
        Self::OutOfRange,
        Self::Locked,
        Self::NotEditable,
        Self::NotFound,
        Self::Forbidden,
        Self::Archived,
        Self::DryRun,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::AlreadyGone => "already-gone",
            Self::Excluded => "excluded",
            Self::KindDisabled => "kind-disabled",
            Self::OutOfRange => "out-of-range",
            Self::Locked => "locked",
            Self::NotEditable => "not-editable",
            Self::NotFound => "not-found",
            Self::Forbidden => "forbidden",
            Self::Archived => "archived",
            Self::DryRun => "dry-run",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl From<PermanentKind> for SkipReason {
    fn from(kind: PermanentKind) -> Self {
        match kind {
            PermanentKind::NotFound => Self::NotFound,
            PermanentKind::Forbidden => Self::Forbidden,
            PermanentKind::Locked => Self::Locked,
            PermanentKind::Archived => Self::Archived,
        }
    }
}

/// Why processing an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailReason {
    EditFailed,
    DeleteFailed,
    GenerationFailed,
}

impl FailReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EditFailed => "edit-failed",
            Self::DeleteFailed => "delete-failed",
            Self::GenerationFailed => "generation-failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "edit-failed" => Some(Self::EditFailed),
            "delete-failed" => Some(Self::DeleteFailed),
            "generation-failed" => Some(Self::GenerationFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Scrubbed,
    Skipped(SkipReason),
    Failed(FailReason),
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        match self {
            Self::Scrubbed => RecordStatus::Scrubbed,
            Self::Skipped(_) => RecordStatus::Skipped,
            Self::Failed(_) => RecordStatus::Failed,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Scrubbed => None,
            Self::Skipped(r) => Some(r.as_str()),
            Self::Failed(r) => Some(r.as_str()),
        }
    }

    /// Rebuild an outcome from its stored status and reason.
    #[must_use]
    pub fn parse(status: &str, reason: Option<&str>) -> Option<Self> {
        match RecordStatus::from_str(status)? {
            RecordStatus::Scrubbed => Some(Self::Scrubbed),
            RecordStatus::Skipped => SkipReason::from_str(reason?).map(Self::Skipped),
            RecordStatus::Failed => FailReason::from_str(reason?).map(Self::Failed),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.status().as_str()),
            None => f.write_str(self.status().as_str()),
        }
    }
}

/// Outcome of processing one item. Never carries the item's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRecord {
    pub item_id: String,
    pub kind: ItemKind,
    pub outcome: Outcome,
    /// The edit was confirmed by the platform echoing the replacement back.
    pub verified: bool,
    /// The original text was overwritten, whether or not the delete went through.
    pub content_destroyed: bool,
    /// Last error message, for inspection of skips and failures.
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ProcessingRecord {
    #[must_use]
    pub fn scrubbed(item: &Item, verified: bool) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            outcome: Outcome::Scrubbed,
            verified,
            content_destroyed: true,
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn skipped(item: &Item, reason: SkipReason, detail: Option<String>) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            outcome: Outcome::Skipped(reason),
            verified: false,
            content_destroyed: false,
            detail,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(
        item: &Item,
        reason: FailReason,
        content_destroyed: bool,
        verified: bool,
        detail: Option<String>,
    ) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            outcome: Outcome::Failed(reason),
            verified,
            content_destroyed,
            detail,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.outcome.status()
    }
}

/// Everything needed to resume an interrupted run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub run_id: i64,
    pub records: HashMap<String, ProcessingRecord>,
    pub cursors: BTreeMap<ItemKind, Cursor>,
}

impl RunState {
    #[must_use]
    pub fn new(run_id: i64) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }
}

/// In-memory bookkeeping for a run.
///
/// Owned by the orchestrator; workers hand back records and never touch it.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: RunState,
    unsaved: Vec<ProcessingRecord>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(run_id: i64) -> Self {
        Self::from_state(RunState::new(run_id))
    }

    #[must_use]
    pub fn from_state(state: RunState) -> Self {
        Self {
            state,
            unsaved: Vec::new(),
        }
    }

    /// Replace the current state with a previously persisted one.
    pub fn restore(&mut self, state: RunState) {
        self.state = state;
        self.unsaved.clear();
    }

    #[must_use]
    pub fn run_id(&self) -> i64 {
        self.state.run_id
    }

    /// Store an outcome. Returns `false` if the item already had one.
    pub fn record_outcome(&mut self, record: ProcessingRecord) -> bool {
        if self.state.records.contains_key(&record.item_id) {
            return false;
        }
        self.unsaved.push(record.clone());
        self.state.records.insert(record.item_id.clone(), record);
        true
    }

    #[must_use]
    pub fn has_processed(&self, item_id: &str) -> bool {
        self.state.records.contains_key(item_id)
    }

    #[must_use]
    pub fn cursor_for(&self, kind: ItemKind) -> Cursor {
        self.state
            .cursors
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Cursor::start(kind))
    }

    /// Move a kind's cursor forward. An exhausted cursor stays exhausted.
    pub fn advance_cursor(&mut self, kind: ItemKind, cursor: Cursor) {
        debug_assert_eq!(kind, cursor.kind);
        if self.cursor_for(kind).exhausted {
            return;
        }
        self.state.cursors.insert(kind, cursor);
    }

    #[must_use]
    pub fn snapshot(&self) -> RunState {
        self.state.clone()
    }

    /// Records added since the last call, in insertion order.
    pub fn take_unsaved(&mut self) -> Vec<ProcessingRecord> {
        std::mem::take(&mut self.unsaved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ItemStatus;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            kind: ItemKind::Comment,
            body: "hello world".to_string(),
            container: "rust".to_string(),
            created_at: Utc::now(),
            editable: true,
            locked: false,
            status: ItemStatus::Live,
        }
    }

    #[test]
    fn test_record_outcome_is_idempotent() {
        let mut tracker = ProgressTracker::new(1);
        assert!(tracker.record_outcome(ProcessingRecord::scrubbed(&item("t1_a"), true)));
        assert!(!tracker.record_outcome(ProcessingRecord::failed(
            &item("t1_a"),
            FailReason::EditFailed,
            false,
            false,
            None,
        )));

        assert!(tracker.has_processed("t1_a"));
        assert_eq!(
            tracker.snapshot().records["t1_a"].status(),
            RecordStatus::Scrubbed
        );
        assert_eq!(tracker.take_unsaved().len(), 1);
        assert!(tracker.take_unsaved().is_empty());
    }

    #[test]
    fn test_cursor_does_not_move_after_exhaustion() {
        let mut tracker = ProgressTracker::new(1);
        assert_eq!(tracker.cursor_for(ItemKind::Post), Cursor::start(ItemKind::Post));

        let done = Cursor {
            kind: ItemKind::Post,
            after: Some("t3_z".to_string()),
            exhausted: true,
        };
        tracker.advance_cursor(ItemKind::Post, done.clone());
        tracker.advance_cursor(ItemKind::Post, Cursor::start(ItemKind::Post));
        assert_eq!(tracker.cursor_for(ItemKind::Post), done);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut tracker = ProgressTracker::new(3);
        tracker.record_outcome(ProcessingRecord::skipped(
            &item("t1_b"),
            SkipReason::Excluded,
            None,
        ));
        let snapshot = tracker.snapshot();

        let mut resumed = ProgressTracker::new(99);
        resumed.restore(snapshot);
        assert_eq!(resumed.run_id(), 3);
        assert!(resumed.has_processed("t1_b"));
        assert_eq!(
            resumed.snapshot().records["t1_b"].outcome,
            Outcome::Skipped(SkipReason::Excluded)
        );
        assert!(resumed.take_unsaved().is_empty());
    }

    #[test]
    fn test_outcome_parse_roundtrip() {
        for outcome in [
            Outcome::Scrubbed,
            Outcome::Skipped(SkipReason::OutOfRange),
            Outcome::Failed(FailReason::DeleteFailed),
        ] {
            let parsed = Outcome::parse(outcome.status().as_str(), outcome.reason());
            assert_eq!(parsed, Some(outcome));
        }
        assert_eq!(Outcome::parse("skipped", None), None);
        assert_eq!(Outcome::parse("bogus", Some("excluded")), None);
    }
}
