//! Adaptive, account-wide request pacing.
//!
//! This module provides the [`RateLimiter`] struct which spaces out requests
//! across the whole worker pool and learns a safe cadence from the server's
//! own rate-limit responses.
//!
//! # Overview
//!
//! The limiter tracks a single "current delay". Every [`RateLimiter::wait`]
//! returns no sooner than that delay after the previous one returned, so
//! request *starts* are serialized even though the downloads themselves run
//! concurrently once admitted.
//!
//! - A rate-limit response multiplies the delay by 1.5, or by 2 when several
//!   arrived within the burst window.
//! - Twenty consecutive successes shave 10% off the delay.
//! - The delay always stays within `[min_delay, max_delay]`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use backup_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)));
//!
//! limiter.wait().await;
//! // ... issue request
//! limiter.record_success();
//! # }
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{
    DEFAULT_MAX_DELAY, DEFAULT_RATE_LIMIT_THRESHOLD, DEFAULT_RATE_LIMIT_WINDOW,
    SUCCESSES_BEFORE_RECOVERY,
};

/// Multiplier applied to the delay on an isolated rate-limit hit.
const MODERATE_BACKOFF: f64 = 1.5;

/// Multiplier applied to the delay when hits arrive in a burst.
const AGGRESSIVE_BACKOFF: f64 = 2.0;

/// Multiplier applied to the delay after a run of successes.
const RECOVERY_FACTOR: f64 = 0.9;

/// Adaptive rate limiter shared by every download worker.
///
/// Designed to be wrapped in `Arc` and shared across Tokio tasks.
///
/// Two locks are used: an async mutex that serializes pacing (and is held
/// across the sleep in [`wait`](Self::wait)), and a short-lived std mutex
/// around the control state so feedback from other workers is never blocked
/// behind a sleeping waiter.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    window: Duration,
    threshold: usize,

    /// When the last `wait()` returned. `None` until the first request.
    last_request: tokio::sync::Mutex<Option<Instant>>,

    state: Mutex<ControlState>,
}

#[derive(Debug)]
struct ControlState {
    current_delay: Duration,
    rate_limit_times: Vec<Instant>,
    consecutive_successes: u32,
}

/// Point-in-time view of the limiter for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    /// Delay currently enforced between requests.
    pub current_delay: Duration,
    /// Whether the delay has grown past twice its floor.
    pub throttled: bool,
}

impl RateLimiter {
    /// Creates a limiter starting at (and never going below) `min_delay`, with
    /// the default ceiling, burst window and threshold.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self::with_settings(
            min_delay,
            DEFAULT_MAX_DELAY,
            DEFAULT_RATE_LIMIT_WINDOW,
            DEFAULT_RATE_LIMIT_THRESHOLD,
        )
    }

    /// Creates a limiter with explicit tuning.
    ///
    /// `max_delay` is raised to `min_delay` if it is smaller, and a zero
    /// `threshold` is treated as 1.
    #[must_use]
    #[instrument(level = "debug", fields(min_ms = min_delay.as_millis(), max_ms = max_delay.as_millis()))]
    pub fn with_settings(
        min_delay: Duration,
        max_delay: Duration,
        window: Duration,
        threshold: usize,
    ) -> Self {
        debug!("creating adaptive rate limiter");
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            window,
            threshold: threshold.max(1),
            last_request: tokio::sync::Mutex::new(None),
            state: Mutex::new(ControlState {
                current_delay: min_delay,
                rate_limit_times: Vec::new(),
                consecutive_successes: 0,
            }),
        }
    }

    /// Returns the delay floor.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Returns the delay ceiling.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the delay currently enforced between requests.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.lock_state().current_delay
    }

    /// True iff the current delay exceeds twice the floor.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.snapshot().throttled
    }

    /// Returns a consistent view of delay and throttle state.
    #[must_use]
    pub fn snapshot(&self) -> LimiterSnapshot {
        let current_delay = self.current_delay();
        LimiterSnapshot {
            current_delay,
            throttled: current_delay > self.min_delay * 2,
        }
    }

    /// Waits until at least the current delay has passed since the previous
    /// call returned, then records "now" as the latest request time.
    ///
    /// The first call never waits.
    pub async fn wait(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            let delay = self.current_delay();
            let elapsed = previous.elapsed();
            if elapsed < delay {
                let remaining = delay.saturating_sub(elapsed);
                debug!(delay_ms = remaining.as_millis(), "pacing request");
                tokio::time::sleep(remaining).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    /// Records a successful request; every twentieth consecutive success
    /// relaxes the delay by 10%.
    pub fn record_success(&self) {
        let mut state = self.lock_state();
        state.consecutive_successes += 1;

        if state.consecutive_successes >= SUCCESSES_BEFORE_RECOVERY {
            let relaxed = state.current_delay.mul_f64(RECOVERY_FACTOR).max(self.min_delay);
            if relaxed != state.current_delay {
                debug!(
                    from_ms = state.current_delay.as_millis(),
                    to_ms = relaxed.as_millis(),
                    "relaxing request delay"
                );
            }
            state.current_delay = relaxed;
            state.consecutive_successes = 0;
        }
    }

    /// Records a rate-limit response observed now.
    pub fn record_rate_limit(&self) {
        self.record_rate_limit_at(Instant::now());
    }

    /// Records a rate-limit response observed at `now`.
    ///
    /// Hits older than the burst window are pruned first; if at least
    /// `threshold` remain the delay doubles, otherwise it grows by half.
    pub fn record_rate_limit_at(&self, now: Instant) {
        let mut state = self.lock_state();
        state.rate_limit_times.push(now);
        state.consecutive_successes = 0;

        let window = self.window;
        state
            .rate_limit_times
            .retain(|t| now.saturating_duration_since(*t) < window);

        let burst = state.rate_limit_times.len() >= self.threshold;
        let factor = if burst {
            AGGRESSIVE_BACKOFF
        } else {
            MODERATE_BACKOFF
        };
        state.current_delay = state.current_delay.mul_f64(factor).min(self.max_delay);

        if burst {
            warn!(
                hits_in_window = state.rate_limit_times.len(),
                delay_ms = state.current_delay.as_millis(),
                "repeated rate limiting - throttling aggressively"
            );
        } else {
            debug!(delay_ms = state.current_delay.as_millis(), "rate limited - backing off");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
