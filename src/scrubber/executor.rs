//! Edit-then-delete for a single item.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::progress::{FailReason, ProcessingRecord, SkipReason};
use super::rate_limiter::RateLimiter;
use super::text::TextGenerator;
use crate::source::{ContentSource, Item, SourceError};

/// Bounded exponential backoff for transient failures.
///
/// The budget applies per item and per step; nothing is shared across items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempt budget runs out. Each attempt first waits on `limiter`.
    ///
    /// # Errors
    ///
    /// Returns the last error seen.
    pub async fn run<T, F, Fut>(
        &self,
        limiter: &RateLimiter,
        op: &'static str,
        item_id: &str,
        mut call: F,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1;
        loop {
            limiter.acquire().await;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        item_id = %item_id,
                        op,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A failure that must stop the whole run.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FatalError {
    pub error: SourceError,
    /// Outcome for the item that hit the error, if it had already been mutated.
    pub record: Option<ProcessingRecord>,
}

/// Performs the scrub sequence for one item at a time.
pub struct MutationExecutor {
    source: Arc<dyn ContentSource>,
    generator: Arc<TextGenerator>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    dry_run: bool,
}

impl MutationExecutor {
    #[must_use]
    pub fn new(
        source: Arc<dyn ContentSource>,
        generator: Arc<TextGenerator>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            generator,
            limiter,
            retry,
            dry_run,
        }
    }

    /// Overwrite the item's body with random text, then delete it.
    ///
    /// The delete is only attempted once the edit has been accepted. Per-item
    /// problems are reported through the returned record.
    ///
    /// # Errors
    ///
    /// Returns [`FatalError`] when the source reports that the session is unusable.
    pub async fn scrub(&self, item: &Item) -> Result<ProcessingRecord, FatalError> {
        if self.dry_run {
            info!(item_id = %item.id, kind = %item.kind, subreddit = %item.container, "Dry run: would scrub");
            return Ok(ProcessingRecord::skipped(item, SkipReason::DryRun, None));
        }

        let replacement = match self.generator.generate(item.kind, &item.body) {
            Ok(text) => text,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Could not generate replacement text");
                return Ok(ProcessingRecord::failed(
                    item,
                    FailReason::GenerationFailed,
                    false,
                    false,
                    Some(e.to_string()),
                ));
            }
        };

        let edit = self
            .retry
            .run(&self.limiter, "edit", &item.id, || {
                self.source.edit_item(&item.id, &replacement)
            })
            .await;

        let verified = match edit {
            Ok(receipt) => match receipt.body {
                Some(body) if body == replacement => true,
                Some(_) => {
                    // The overwrite did not take; deleting now would keep the original.
                    warn!(item_id = %item.id, "Echoed body differs from replacement; not deleting");
                    return Ok(ProcessingRecord::failed(
                        item,
                        FailReason::EditFailed,
                        false,
                        false,
                        Some("echoed body differs from replacement".to_string()),
                    ));
                }
                None => {
                    debug!(item_id = %item.id, "Edit accepted without echoed body");
                    false
                }
            },
            Err(SourceError::Verification(message)) => {
                warn!(item_id = %item.id, %message, "Edit accepted but could not be verified");
                false
            }
            Err(SourceError::Permanent { kind, message }) => {
                info!(item_id = %item.id, reason = %kind, "Edit refused, skipping item");
                return Ok(ProcessingRecord::skipped(item, kind.into(), Some(message)));
            }
            Err(SourceError::Transient(message)) => {
                warn!(
                    item_id = %item.id,
                    attempts = self.retry.max_attempts,
                    %message,
                    "Edit failed after retries; not deleting"
                );
                return Ok(ProcessingRecord::failed(
                    item,
                    FailReason::EditFailed,
                    false,
                    false,
                    Some(message),
                ));
            }
            Err(error @ SourceError::Fatal(_)) => {
                return Err(FatalError {
                    error,
                    record: None,
                });
            }
        };
        debug!(item_id = %item.id, verified, "Body overwritten");

        let delete = self
            .retry
            .run(&self.limiter, "delete", &item.id, || {
                self.source.delete_item(&item.id)
            })
            .await;

        match delete {
            Ok(()) | Err(SourceError::Verification(_)) => {
                info!(item_id = %item.id, kind = %item.kind, subreddit = %item.container, verified, "Scrubbed");
                Ok(ProcessingRecord::scrubbed(item, verified))
            }
            Err(error @ SourceError::Fatal(_)) => {
                let record = ProcessingRecord::failed(
                    item,
                    FailReason::DeleteFailed,
                    true,
                    verified,
                    Some(error.to_string()),
                );
                Err(FatalError {
                    error,
                    record: Some(record),
                })
            }
            Err(e) => {
                // The original text is already gone; only the shell remains.
                warn!(item_id = %item.id, error = %e, "Delete failed after overwrite");
                Ok(ProcessingRecord::failed(
                    item,
                    FailReason::DeleteFailed,
                    true,
                    verified,
                    Some(e.to_string()),
                ))
            }
        }
    }
}
