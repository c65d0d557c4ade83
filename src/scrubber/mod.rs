//! Scrubbing: deciding what to touch, overwriting it, deleting it, and
//! remembering what was done.

pub mod eligibility;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod rate_limiter;
pub mod summary;
pub mod text;

pub use eligibility::{should_process, Eligibility, ExclusionConfig};
pub use executor::{FatalError, MutationExecutor, RetryPolicy};
pub use pipeline::Pipeline;
pub use progress::{
    FailReason, Outcome, ProcessingRecord, ProgressTracker, RecordStatus, RunState, SkipReason,
};
pub use rate_limiter::RateLimiter;
pub use summary::{KindOutcome, RunSummary};
pub use text::{GenerationError, LengthBounds, TextConstraints, TextGenerator};
