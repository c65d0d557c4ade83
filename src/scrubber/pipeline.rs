//! Drives enumeration, filtering and scrubbing for both content kinds.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::eligibility::{should_process, Eligibility, ExclusionConfig};
use super::executor::{MutationExecutor, RetryPolicy};
use super::progress::{ProcessingRecord, ProgressTracker, RunState, SkipReason};
use super::rate_limiter::RateLimiter;
use super::summary::{KindOutcome, RunSummary};
use super::text::TextGenerator;
use crate::config::Config;
use crate::db::{self, Database};
use crate::source::{ContentSource, Cursor, Item, ItemKind, Page, SourceError};

/// Shared between the post and comment streams of a single run.
struct RunContext {
    tracker: Mutex<ProgressTracker>,
    cancel: CancellationToken,
    fatal: Mutex<Option<String>>,
}

impl RunContext {
    async fn abort(&self, error: &SourceError) {
        error!(error = %error, "Fatal error, stopping run");
        self.fatal.lock().await.get_or_insert_with(|| error.to_string());
        self.cancel.cancel();
    }
}

/// Result of draining one page.
struct Drained {
    records: Vec<ProcessingRecord>,
    /// Every item on the page has an outcome.
    complete: bool,
}

/// Scrub pipeline.
pub struct Pipeline {
    db: Database,
    source: Arc<dyn ContentSource>,
    executor: Arc<MutationExecutor>,
    limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    exclusions: ExclusionConfig,
    fetch_retry: RetryPolicy,
    dry_run: bool,
}

impl Pipeline {
    /// Create a pipeline over the given source.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement text constraints are unusable.
    pub fn new(config: &Config, db: Database, source: Arc<dyn ContentSource>) -> Result<Self> {
        let generator = TextGenerator::new(config.text_constraints(), config.random_seed)
            .context("Invalid replacement text settings")?;
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_min));
        let executor = Arc::new(MutationExecutor::new(
            Arc::clone(&source),
            Arc::new(generator),
            Arc::clone(&limiter),
            config.retry_policy(),
            config.dry_run,
        ));

        if config.dry_run {
            info!("Dry run: nothing will be edited, deleted or saved");
        }

        Ok(Self {
            db,
            source,
            executor,
            limiter,
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            exclusions: config.exclusion_config(),
            fetch_retry: config.retry_policy(),
            dry_run: config.dry_run,
        })
    }

    /// Run until both listings are exhausted, the token is cancelled, or a
    /// fatal error occurs.
    ///
    /// Progress is committed after every page, so an interrupted run resumes
    /// where it stopped on the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if the run state cannot be loaded or saved, or if the
    /// source reported a fatal error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let state = self.load_state().await?;
        let run_id = state.run_id;
        info!(
            run_id,
            recorded = state.records.len(),
            source = self.source.source_id(),
            "Starting scrub run"
        );

        let ctx = RunContext {
            tracker: Mutex::new(ProgressTracker::from_state(state)),
            cancel: cancel.child_token(),
            fatal: Mutex::new(None),
        };

        let (posts, comments) = tokio::join!(
            self.drive(ItemKind::Post, &ctx),
            self.drive(ItemKind::Comment, &ctx)
        );

        let mut summary = posts;
        summary.merge(comments);
        summary.run_id = run_id;

        if let Some(message) = ctx.fatal.lock().await.take() {
            return Err(anyhow!("Run {run_id} aborted: {message}"));
        }

        if summary.is_complete() && !self.dry_run {
            db::complete_run(self.db.pool(), run_id).await?;
            info!(run_id, "Run complete");
        } else if cancel.is_cancelled() {
            info!(run_id, "Run interrupted; it will resume on the next start");
        }

        Ok(summary)
    }

    async fn load_state(&self) -> Result<RunState> {
        if !self.dry_run {
            return db::resume_or_create_run(self.db.pool()).await;
        }
        // Dry runs read existing progress but never start a run of their own.
        match db::get_active_run(self.db.pool()).await? {
            Some(run) => db::load_run_state(self.db.pool(), run.id).await,
            None => Ok(RunState::new(0)),
        }
    }

    /// Process one content kind until its listing is exhausted or it stops.
    async fn drive(&self, kind: ItemKind, ctx: &RunContext) -> RunSummary {
        let mut summary = RunSummary::default();
        let outcome = self.drive_pages(kind, ctx, &mut summary).await;
        debug!(kind = %kind, outcome = %outcome, "Stream stopped");
        summary.kinds.insert(kind, outcome);
        summary
    }

    async fn drive_pages(
        &self,
        kind: ItemKind,
        ctx: &RunContext,
        summary: &mut RunSummary,
    ) -> KindOutcome {
        if !self.exclusions.includes(kind) {
            return KindOutcome::Disabled;
        }

        loop {
            if ctx.cancel.is_cancelled() {
                return KindOutcome::Cancelled;
            }

            let cursor = ctx.tracker.lock().await.cursor_for(kind);
            if cursor.exhausted {
                return KindOutcome::Done;
            }

            let page = match self.fetch(&cursor).await {
                Ok(page) => page,
                Err(e) if e.is_fatal() => {
                    ctx.abort(&e).await;
                    return KindOutcome::Cancelled;
                }
                Err(e) => {
                    warn!(kind = %kind, after = ?cursor.after, error = %e, "Listing failed");
                    return KindOutcome::Aborted(e.to_string());
                }
            };
            debug!(kind = %kind, items = page.items.len(), done = page.done, "Fetched page");

            let mut next = cursor.advance(&page);
            if !next.exhausted && next.after == cursor.after {
                warn!(
                    kind = %kind,
                    after = ?cursor.after,
                    "Listing did not advance, treating as exhausted"
                );
                next.exhausted = true;
            }

            let drained = self.drain(page.items, ctx, summary).await;
            let completed = drained.complete.then_some(next);
            if let Err(e) = self
                .commit(ctx, kind, drained.records, completed, summary)
                .await
            {
                error!(kind = %kind, error = %e, "Failed to save progress");
                ctx.abort(&SourceError::fatal(format!("{e:#}"))).await;
                return KindOutcome::Cancelled;
            }

            if !drained.complete {
                return if ctx.cancel.is_cancelled() {
                    KindOutcome::Cancelled
                } else {
                    KindOutcome::Aborted("page not fully processed".to_string())
                };
            }
        }
    }

    async fn fetch(&self, cursor: &Cursor) -> Result<Page, SourceError> {
        let label = cursor.after.as_deref().unwrap_or("start");
        self.fetch_retry
            .run(&self.limiter, "list", label, || self.source.list(cursor))
            .await
    }

    /// Filter a page and hand eligible items to the worker pool.
    ///
    /// Workers already running are awaited even after cancellation; items not
    /// yet dispatched are left for the next run.
    async fn drain(
        &self,
        items: Vec<Item>,
        ctx: &RunContext,
        summary: &mut RunSummary,
    ) -> Drained {
        let now = Utc::now();
        let mut records = Vec::new();
        let mut eligible = Vec::new();
        {
            let tracker = ctx.tracker.lock().await;
            let mut seen = HashSet::new();
            for item in items {
                if !seen.insert(item.id.clone()) {
                    summary.add_skip(SkipReason::Duplicate);
                    continue;
                }
                match should_process(&item, &self.exclusions, &tracker, now) {
                    Eligibility::Process => eligible.push(item),
                    Eligibility::Skip(SkipReason::Duplicate) => {
                        debug!(item_id = %item.id, "Already handled in this run");
                        summary.add_skip(SkipReason::Duplicate);
                    }
                    Eligibility::Skip(reason) => {
                        debug!(item_id = %item.id, reason = reason.as_str(), "Skipping");
                        records.push(ProcessingRecord::skipped(&item, reason, None));
                    }
                }
            }
        }

        let mut complete = true;
        let mut handles = Vec::new();

        for item in eligible {
            let permit = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                complete = false;
                break;
            };

            let executor = Arc::clone(&self.executor);
            let cancel = ctx.cancel.clone();
            let handle = tokio::spawn(async move {
                let result = executor.scrub(&item).await;
                if result.is_err() {
                    // Stop dispatch before the permit frees up for the next item.
                    cancel.cancel();
                }
                drop(permit);
                result
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(fatal)) => {
                    if let Some(record) = fatal.record {
                        records.push(record);
                    }
                    ctx.abort(&fatal.error).await;
                    complete = false;
                }
                Err(e) => {
                    error!("Worker task panicked: {e}");
                    complete = false;
                }
            }
        }

        Drained { records, complete }
    }

    /// Record outcomes and, if given, the cursor they complete, then persist both.
    async fn commit(
        &self,
        ctx: &RunContext,
        kind: ItemKind,
        records: Vec<ProcessingRecord>,
        cursor: Option<Cursor>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut tracker = ctx.tracker.lock().await;
        for record in records {
            if tracker.has_processed(&record.item_id) {
                debug!(kind = %kind, item_id = %record.item_id, "Outcome already recorded");
                summary.add_skip(SkipReason::Duplicate);
                continue;
            }
            summary.add(&record);
            tracker.record_outcome(record);
        }
        if let Some(cursor) = &cursor {
            tracker.advance_cursor(kind, cursor.clone());
        }

        let unsaved = tracker.take_unsaved();
        if self.dry_run {
            return Ok(());
        }
        db::commit_page(self.db.pool(), tracker.run_id(), &unsaved, cursor.as_ref()).await
    }
}
