use std::fmt;

use thiserror::Error;

/// Why the platform refused an operation for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    NotFound,
    Forbidden,
    Locked,
    Archived,
}

impl PermanentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Forbidden => "forbidden",
            Self::Locked => "locked",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed classification of everything a content source can fail with.
///
/// Client implementations map their own error hierarchy onto these four
/// classes; retry policy only ever looks at the class.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Network failure, timeout or rate limiting. Worth retrying.
    #[error("transient error: {0}")]
    Transient(String),
    /// The item cannot be changed. Not retried; the item is skipped.
    #[error("permanent error ({kind}): {message}")]
    Permanent { kind: PermanentKind, message: String },
    /// The edit was accepted but its result could not be confirmed.
    #[error("unverified edit: {0}")]
    Verification(String),
    /// Authentication lost or configuration rejected. Aborts the run.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        Self::Permanent {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Fatal(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}
