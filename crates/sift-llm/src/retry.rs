use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

const DEFAULT_MAX_ATTEMPTS: u32 = 6;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);

/// Picks the actual wait inside `[floor, ceiling]`.
pub type JitterFn = fn(floor: Duration, ceiling: Duration) -> Duration;

/// Uniformly random wait between `floor` and `ceiling`.
#[must_use]
pub fn uniform_jitter(floor: Duration, ceiling: Duration) -> Duration {
    let lo = u64::try_from(floor.as_millis()).unwrap_or(u64::MAX);
    let hi = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    if hi <= lo {
        return ceiling;
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// Always waits the full ceiling. Deterministic, for tests and reproducible runs.
#[must_use]
pub fn no_jitter(_floor: Duration, ceiling: Duration) -> Duration {
    ceiling
}

/// Exponential backoff with jitter, bounded by attempt count and a per-wait cap.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    jitter: JitterFn,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: uniform_jitter,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: uniform_jitter,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before the retry that follows failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let ceiling = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let floor = self.base_delay.min(ceiling);
        (self.jitter)(floor, ceiling).min(self.max_delay)
    }

    /// Run `f` until it succeeds, fails with a non-transient error, or the attempt budget
    /// is spent. The last error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient failure, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation, attempts = attempt + 1, "retries exhausted: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}
