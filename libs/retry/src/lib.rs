//! Bounded-retry primitives for remote platform calls.
//!
//! Every remote call in the pool subsystem that may fail transiently
//! (network blips, rate limits, eventual-consistency lag on freshly created
//! records) runs through [`run`] with a [`RetryPolicy`]. Key concepts:
//!
//! - **Attempt budget**: a policy allows a total of `max_attempts` attempts;
//!   once spent, the last error surfaces as [`RetryError::Exhausted`].
//! - **Tagged outcome**: each attempt reports [`Attempt::Done`],
//!   [`Attempt::Retry`], or [`Attempt::Bail`]. A bail aborts immediately and
//!   is never re-attempted.
//! - **Idempotency**: only operations that are safe to re-issue (queries,
//!   describes, deletes by id) may be wrapped. Creating a brand-new org is
//!   never wrapped, because a retry would provision a duplicate environment.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// A bounded retry policy: total attempt budget plus a minimum delay floor.
///
/// The delay between attempts backs off exponentially from the floor:
/// `min_delay * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts allowed, including the first.
    pub max_attempts: u32,

    /// Delay floor before the second attempt.
    pub min_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and delay floor.
    pub const fn new(max_attempts: u32, min_delay: Duration) -> Self {
        Self {
            max_attempts,
            min_delay,
        }
    }

    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.min_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Standard attempt budget for remote calls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Tier for metadata/prerequisite describes (fast-converging).
pub const METADATA_TIER: RetryPolicy =
    RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(2));

/// Tier for SOQL queries and record writes.
pub const QUERY_TIER: RetryPolicy = RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(3));

/// Tier for slow-propagating calls (schema describe, limits, email actions).
pub const SLOW_TIER: RetryPolicy = RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(30));

/// Outcome of a single attempt of a retryable unit of work.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded; stop retrying.
    Done(T),

    /// The operation failed transiently; retry if budget remains.
    Retry(E),

    /// The operation failed fatally; abort without further attempts.
    Bail(E),
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The attempt budget was spent; carries the last transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The operation signalled it must not be retried.
    #[error(transparent)]
    Aborted(E),
}

impl<E> RetryError<E> {
    /// The underlying error, regardless of how the retry loop ended.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted(e) => e,
        }
    }
}

/// Run an operation under a retry policy.
///
/// The operation receives the 1-based attempt number, mainly for logging.
/// Transient failures sleep for the policy's backoff delay before the next
/// attempt; a [`Attempt::Bail`] aborts immediately.
pub async fn run<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    debug_assert!(policy.max_attempts >= 1);

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        match operation(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Bail(error) => return Err(RetryError::Aborted(error)),
            Attempt::Retry(error) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
