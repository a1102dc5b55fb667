//! Reconnect policy for the streaming connection.
//!
//! Delay before zero-indexed attempt `n`:
//!
//! ```text
//! base_delay * 2^n + random[0, max_jitter)
//! ```
//!
//! The jitter is drawn again for every attempt.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;
use tracing::debug;

use crate::error::Error;

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 100;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound (exclusive) of the random jitter.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(3000);

// ============================================================================
// Types
// ============================================================================

/// Decides whether a failed attempt should be retried.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Produces the wait before a retry, given the zero-indexed attempt.
pub type RetryWait = Arc<dyn Fn(u32) -> BoxFuture<'static, ()> + Send + Sync>;

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before attempt 0, doubled per attempt.
    pub base_delay: Duration,
    /// Exclusive upper bound of the added jitter.
    pub max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl Backoff {
    /// Computes the delay before zero-indexed `attempt`.
    ///
    /// Saturates instead of overflowing for large attempts.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let exponential = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exponential.saturating_add(self.jitter_ms()))
    }

    fn jitter_ms(&self) -> u64 {
        let max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return 0;
        }
        rand::rng().random_range(0..max)
    }
}

// ============================================================================
// RetryOptions
// ============================================================================

/// Reconnect policy of a streaming connection.
///
/// # Example
///
/// ```ignore
/// use graphql_link::RetryOptions;
///
/// let retry = RetryOptions::new()
///     .with_attempts(10)
///     .with_should_retry(|err| err.is_recoverable());
/// ```
#[derive(Clone)]
pub struct RetryOptions {
    /// Maximum number of failed attempts before giving up.
    pub attempts: u32,
    /// Backoff used by the default wait.
    pub backoff: Backoff,
    should_retry: RetryPredicate,
    wait: Option<RetryWait>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: Backoff::default(),
            should_retry: Arc::new(|_| true),
            wait: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("attempts", &self.attempts)
            .field("backoff", &self.backoff)
            .field("custom_wait", &self.wait.is_some())
            .finish_non_exhaustive()
    }
}

impl RetryOptions {
    /// Creates the default policy: always retry, 100 attempts, 1s base, 3s jitter.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts.
    #[inline]
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the backoff used by the default wait.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the retry predicate.
    #[must_use]
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Replaces the wait between attempts.
    #[must_use]
    pub fn with_wait<F>(mut self, wait: F) -> Self
    where
        F: Fn(u32) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.wait = Some(Arc::new(wait));
        self
    }

    /// Evaluates the retry predicate.
    #[inline]
    #[must_use]
    pub fn should_retry(&self, error: &Error) -> bool {
        (self.should_retry)(error)
    }

    /// Returns the wait before zero-indexed `attempt`.
    #[must_use]
    pub fn wait(&self, attempt: u32) -> BoxFuture<'static, ()> {
        if let Some(wait) = &self.wait {
            return wait(attempt);
        }

        let delay = self.backoff.delay(attempt);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Waiting before reconnect"
        );
        Box::pin(tokio::time::sleep(delay))
    }
}

// ============================================================================
// Tests
// ============================================================================
