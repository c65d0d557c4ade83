use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use super::progress::{Outcome, ProcessingRecord, SkipReason};
use crate::source::ItemKind;

/// Terminal state of one content kind's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    /// Listing exhausted and every page drained.
    Done,
    /// Listing could not be fetched; the cursor stays where it was.
    Aborted(String),
    /// Stopped by an operator interrupt or by a fatal error elsewhere.
    Cancelled,
    /// Excluded by configuration; never listed.
    Disabled,
}

impl fmt::Display for KindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Aborted(reason) => write!(f, "aborted ({reason})"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Counters for one invocation of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Run the counters belong to.
    pub run_id: i64,
    /// Edited and deleted.
    pub scrubbed: usize,
    /// Edit applied, regardless of whether the delete went through.
    pub content_destroyed: usize,
    /// Scrubbed items whose edit could not be confirmed.
    pub unverified: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub failed: BTreeMap<&'static str, usize>,
    pub kinds: BTreeMap<ItemKind, KindOutcome>,
}

impl RunSummary {
    pub fn add(&mut self, record: &ProcessingRecord) {
        match record.outcome {
            Outcome::Scrubbed => {
                self.scrubbed += 1;
                if !record.verified {
                    self.unverified += 1;
                }
            }
            Outcome::Skipped(reason) => self.add_skip(reason),
            Outcome::Failed(reason) => *self.failed.entry(reason.as_str()).or_default() += 1,
        }
        if record.content_destroyed {
            self.content_destroyed += 1;
        }
    }

    /// Count a skip that produced no record, such as a duplicate.
    pub fn add_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason.as_str()).or_default() += 1;
    }

    /// Fold another summary's counters into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.scrubbed += other.scrubbed;
        self.content_destroyed += other.content_destroyed;
        self.unverified += other.unverified;
        for (reason, count) in other.skipped {
            *self.skipped.entry(reason).or_default() += count;
        }
        for (reason, count) in other.failed {
            *self.failed.entry(reason).or_default() += count;
        }
        self.kinds.extend(other.kinds);
    }

    #[must_use]
    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        ItemKind::ALL.iter().all(|kind| {
            matches!(
                self.kinds.get(kind),
                Some(KindOutcome::Done | KindOutcome::Disabled)
            )
        })
    }

    /// Emit the summary through tracing.
    pub fn log(&self) {
        info!(
            scrubbed = self.scrubbed,
            content_destroyed = self.content_destroyed,
            unverified = self.unverified,
            skipped = self.total_skipped(),
            failed = self.total_failed(),
            "Run finished"
        );
        for (reason, count) in &self.skipped {
            info!(reason = %reason, count, "Skipped");
        }
        for (reason, count) in &self.failed {
            info!(reason = %reason, count, "Failed");
        }
        for (kind, outcome) in &self.kinds {
            info!(kind = %kind, outcome = %outcome, "Stream finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::scrubber::progress::FailReason;
    use crate::source::{Item, ItemStatus};

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            kind: ItemKind::Comment,
            body: String::new(),
            container: "rust".to_string(),
            created_at: Utc::now(),
            editable: true,
            locked: false,
            status: ItemStatus::Live,
        }
    }

    #[test]
    fn test_counts_and_breakdowns() {
        let mut summary = RunSummary::default();
        summary.add(&ProcessingRecord::scrubbed(&item("a"), true));
        summary.add(&ProcessingRecord::scrubbed(&item("b"), false));
        summary.add(&ProcessingRecord::failed(
            &item("c"),
            FailReason::DeleteFailed,
            true,
            true,
            None,
        ));
        summary.add(&ProcessingRecord::failed(
            &item("d"),
            FailReason::EditFailed,
            false,
            false,
            None,
        ));
        summary.add(&ProcessingRecord::skipped(&item("e"), SkipReason::Excluded, None));

        assert_eq!(summary.scrubbed, 2);
        assert_eq!(summary.unverified, 1);
        assert_eq!(summary.content_destroyed, 3);
        assert_eq!(summary.total_failed(), 2);
        assert_eq!(summary.failed.get("delete-failed"), Some(&1));
        assert_eq!(summary.skipped.get("excluded"), Some(&1));
    }

    #[test]
    fn test_is_complete() {
        let mut summary = RunSummary::default();
        summary.kinds.insert(ItemKind::Post, KindOutcome::Disabled);
        assert!(!summary.is_complete());
        summary
            .kinds
            .insert(ItemKind::Comment, KindOutcome::Aborted("503".to_string()));
        assert!(!summary.is_complete());
        summary.kinds.insert(ItemKind::Comment, KindOutcome::Done);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_merge() {
        let mut posts = RunSummary::default();
        posts.add(&ProcessingRecord::scrubbed(&item("a"), true));
        posts.add_skip(SkipReason::Duplicate);
        posts.kinds.insert(ItemKind::Post, KindOutcome::Done);

        let mut comments = RunSummary::default();
        comments.add_skip(SkipReason::Duplicate);
        comments.kinds.insert(ItemKind::Comment, KindOutcome::Cancelled);

        posts.merge(comments);
        assert_eq!(posts.scrubbed, 1);
        assert_eq!(posts.skipped.get("duplicate"), Some(&2));
        assert_eq!(posts.kinds.len(), 2);
        assert!(!posts.is_complete());
    }
}
