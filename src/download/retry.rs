//! Retry logic with full-jitter exponential backoff.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying remote errors and determining retry behavior.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::RateLimited`] - The remote asked us to slow down (retried, feeds the limiter)
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Fatal`] - Failures that won't succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether another attempt is allowed and how
//! long to sleep first. Every failure, rate-limited or not, consumes an attempt.
//!
//! # Example
//!
//! ```
//! use backup_core::download::{classify_error, RetryDecision, RetryPolicy};
//! use backup_core::remote::RemoteError;
//!
//! let policy = RetryPolicy::default();
//! let error = RemoteError::transient("/a.txt", "connection reset");
//!
//! match policy.should_retry(classify_error(&error), 0, error.retry_after()) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::constants::DEFAULT_MAX_RETRIES;
use crate::remote::RemoteError;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default maximum backoff delay (60 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Default backoff multiplier (doubles each attempt).
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Classification of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The remote is rate limiting this account.
    RateLimited,

    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection reset, read timeout, 5xx responses.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: file not found, expired token, local disk errors.
    Fatal,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Zero-based index of the next attempt.
        attempt: u32,
    },

    /// Give up on this file.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with full-jitter exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `base_delay`: 1 second
/// - `max_delay`: 60 seconds
/// - `factor`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// ceiling = min(max_delay, base_delay * factor^attempt)
/// delay   = uniform(0, ceiling)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Backoff ceiling for the first failed attempt.
    base_delay: Duration,

    /// Upper bound on any backoff.
    max_delay: Duration,

    /// Multiplier applied per attempt.
    factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_MAX,
            factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Backoff ceiling for attempt 0
    /// * `max_delay` - Maximum delay cap
    /// * `factor` - Multiplier for exponential increase
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            factor,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after attempt `attempt` (zero-based) failed.
    ///
    /// `suggested` is the server's own wait hint; when present it replaces the
    /// computed backoff for rate-limited failures.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(
        &self,
        failure_type: FailureType,
        attempt: u32,
        suggested: Option<Duration>,
    ) -> RetryDecision {
        if failure_type == FailureType::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if attempt + 1 >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match (failure_type, suggested) {
            (FailureType::RateLimited, Some(wait)) => wait,
            _ => self.backoff(attempt),
        };

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Upper bound of the backoff for `attempt`: `min(max_delay, base * factor^attempt)`.
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Full-jitter backoff: a uniformly random delay in `[0, backoff_ceiling(attempt)]`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..=ceiling.as_secs_f64());
        Duration::from_secs_f64(secs).min(ceiling)
    }
}

/// Classifies a remote error into a failure type for retry decisions.
#[must_use]
pub fn classify_error(error: &RemoteError) -> FailureType {
    match error {
        RemoteError::RateLimited { .. } => FailureType::RateLimited,
        RemoteError::Transient { .. } => FailureType::Transient,
        RemoteError::Fatal { .. } => FailureType::Fatal,
    }
}
