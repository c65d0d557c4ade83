use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two independently paginated content streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Post,
    Comment,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Post, ItemKind::Comment];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    /// Reddit "thing" prefix for fullnames of this kind.
    #[must_use]
    pub fn fullname_prefix(&self) -> &'static str {
        match self {
            Self::Post => "t3_",
            Self::Comment => "t1_",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deletion state of an item as last observed from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Live,
    Deleted,
    Removed,
}

impl ItemStatus {
    #[must_use]
    pub fn is_gone(&self) -> bool {
        !matches!(self, Self::Live)
    }
}

/// One post or comment authored by the target user.
///
/// The body is held only while the item is in flight; nothing derived from it
/// is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Item {
    /// Fullname, e.g. `t1_abc123`.
    pub id: String,
    pub kind: ItemKind,
    pub body: String,
    /// Subreddit the item lives in.
    pub container: String,
    pub created_at: DateTime<Utc>,
    /// Whether the platform allows the body to be edited at all.
    pub editable: bool,
    /// Locked or archived threads reject edits.
    pub locked: bool,
    pub status: ItemStatus,
}

// Hand-written so the body never ends up in logs.
impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("body_len", &self.body.chars().count())
            .field("container", &self.container)
            .field("created_at", &self.created_at)
            .field("editable", &self.editable)
            .field("locked", &self.locked)
            .field("status", &self.status)
            .finish()
    }
}

impl Item {
    /// Short id without the `t1_` / `t3_` prefix.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id
            .strip_prefix(self.kind.fullname_prefix())
            .unwrap_or(&self.id)
    }
}

/// Pagination position for one content kind.
///
/// `after == None` with `exhausted == false` is the start of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub kind: ItemKind,
    pub after: Option<String>,
    pub exhausted: bool,
}

impl Cursor {
    #[must_use]
    pub fn start(kind: ItemKind) -> Self {
        Self {
            kind,
            after: None,
            exhausted: false,
        }
    }

    /// The cursor that follows a fully drained page.
    #[must_use]
    pub fn advance(&self, page: &Page) -> Self {
        Self {
            kind: self.kind,
            after: page.next.clone().or_else(|| self.after.clone()),
            exhausted: page.done || page.next.is_none(),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub next: Option<String>,
    pub done: bool,
}

/// Result of an accepted edit.
#[derive(Debug, Clone, Default)]
pub struct EditReceipt {
    /// Body echoed back by the platform, if it returned one.
    pub body: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advance_keeps_last_token_when_done() {
        let cursor = Cursor {
            kind: ItemKind::Comment,
            after: Some("t1_a".to_string()),
            exhausted: false,
        };
        let page = Page {
            items: vec![],
            next: None,
            done: true,
        };
        let next = cursor.advance(&page);
        assert!(next.exhausted);
        assert_eq!(next.after.as_deref(), Some("t1_a"));
    }

    #[test]
    fn test_cursor_advance_moves_forward() {
        let cursor = Cursor::start(ItemKind::Post);
        let page = Page {
            items: vec![],
            next: Some("t3_b".to_string()),
            done: false,
        };
        let next = cursor.advance(&page);
        assert!(!next.exhausted);
        assert_eq!(next.after.as_deref(), Some("t3_b"));
    }

    #[test]
    fn test_item_kind_roundtrip_names() {
        for kind in ItemKind::ALL {
            assert_eq!(ItemKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::from_str("link"), None);
    }

    #[test]
    fn test_debug_hides_body() {
        let item = Item {
            id: "t1_x".to_string(),
            kind: ItemKind::Comment,
            body: "secret words".to_string(),
            container: "rust".to_string(),
            created_at: Utc::now(),
            editable: true,
            locked: false,
            status: ItemStatus::Live,
        };
        let rendered = format!("{item:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(item.short_id(), "x");
    }
}
