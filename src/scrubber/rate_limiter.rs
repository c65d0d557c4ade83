//! Shared request budget for every call made against the platform.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Token bucket shared by the orchestrator and all workers.
///
/// Callers that find the bucket empty sleep until the next token is due
/// instead of polling.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    tokens_per_sec: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `per_minute` requests per minute on average,
    /// with bursts of up to `burst` requests.
    #[must_use]
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens_per_sec: f64::from(per_minute.max(1)) / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter with a burst of a tenth of the per-minute budget.
    #[must_use]
    pub fn per_minute(per_minute: u32) -> Self {
        Self::new(per_minute, (per_minute / 10).max(1))
    }

    /// Wait until a request may be issued, then consume one token.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.tokens_per_sec)
            };
            trace!(wait_ms = wait.as_millis(), "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = elapsed
            .mul_add(self.tokens_per_sec, bucket.tokens)
            .min(self.capacity);
        bucket.last_refill = now;
    }
}
