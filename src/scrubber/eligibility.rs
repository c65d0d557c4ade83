//! Decide, per item, whether it should be scrubbed.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use super::progress::{ProgressTracker, SkipReason};
use crate::source::{Item, ItemKind};

/// What to leave alone.
#[derive(Debug, Clone)]
pub struct ExclusionConfig {
    preserve_ids: HashSet<String>,
    preserve_containers: HashSet<String>,
    only_containers: HashSet<String>,
    min_age: Duration,
    max_age: Option<Duration>,
    include_posts: bool,
    include_comments: bool,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            preserve_ids: HashSet::new(),
            preserve_containers: HashSet::new(),
            only_containers: HashSet::new(),
            min_age: Duration::zero(),
            max_age: None,
            include_posts: true,
            include_comments: true,
        }
    }
}

impl ExclusionConfig {
    /// Build an exclusion config.
    ///
    /// Ids are matched with or without their `t1_`/`t3_` prefix; container
    /// names are matched case-insensitively and may carry an `r/` prefix.
    #[must_use]
    pub fn new(
        preserve_ids: &[String],
        preserve_containers: &[String],
        only_containers: &[String],
        min_age: Duration,
        max_age: Option<Duration>,
        include_posts: bool,
        include_comments: bool,
    ) -> Self {
        Self {
            preserve_ids: preserve_ids.iter().map(|id| normalize_id(id)).collect(),
            preserve_containers: preserve_containers
                .iter()
                .map(|c| normalize_container(c))
                .collect(),
            only_containers: only_containers
                .iter()
                .map(|c| normalize_container(c))
                .collect(),
            min_age,
            max_age,
            include_posts,
            include_comments,
        }
    }

    #[must_use]
    pub fn includes(&self, kind: ItemKind) -> bool {
        match kind {
            ItemKind::Post => self.include_posts,
            ItemKind::Comment => self.include_comments,
        }
    }

    fn is_excluded(&self, item: &Item) -> bool {
        if self.preserve_ids.contains(&normalize_id(item.short_id())) {
            return true;
        }
        let container = normalize_container(&item.container);
        if self.preserve_containers.contains(&container) {
            return true;
        }
        !self.only_containers.is_empty() && !self.only_containers.contains(&container)
    }

    fn in_age_range(&self, item: &Item, now: DateTime<Utc>) -> bool {
        let age = now - item.created_at;
        if age < self.min_age {
            return false;
        }
        self.max_age.map_or(true, |max| age <= max)
    }
}

/// Verdict of the eligibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Process,
    Skip(SkipReason),
}

/// Apply the exclusion rules to one item.
///
/// Rules are checked in order: already recorded in this run, already gone
/// upstream, excluded by id/container/kind, outside the age window, and
/// finally whether the platform allows the body to be edited. Pure given its
/// inputs.
#[must_use]
pub fn should_process(
    item: &Item,
    config: &ExclusionConfig,
    progress: &ProgressTracker,
    now: DateTime<Utc>,
) -> Eligibility {
    if progress.has_processed(&item.id) {
        return Eligibility::Skip(SkipReason::Duplicate);
    }
    if item.status.is_gone() {
        return Eligibility::Skip(SkipReason::AlreadyGone);
    }
    if !config.includes(item.kind) {
        return Eligibility::Skip(SkipReason::KindDisabled);
    }
    if config.is_excluded(item) {
        return Eligibility::Skip(SkipReason::Excluded);
    }
    if !config.in_age_range(item, now) {
        return Eligibility::Skip(SkipReason::OutOfRange);
    }
    // Deleting without an overwrite would leave the original text behind.
    if !item.editable {
        return Eligibility::Skip(SkipReason::NotEditable);
    }
    if item.locked {
        return Eligibility::Skip(SkipReason::Locked);
    }
    Eligibility::Process
}

fn normalize_id(id: &str) -> String {
    id.trim()
        .strip_prefix("t1_")
        .or_else(|| id.trim().strip_prefix("t3_"))
        .unwrap_or_else(|| id.trim())
        .to_lowercase()
}

fn normalize_container(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix("/r/")
        .or_else(|| name.strip_prefix("r/"))
        .unwrap_or(name);
    name.to_lowercase()
}
