//! Concurrent download engine.
//!
//! This module turns a flat list of remote files into completed local files:
//! a bounded worker pool ([`Engine`]), account-wide adaptive pacing
//! ([`RateLimiter`]), retry with full-jitter backoff ([`RetryPolicy`]) and the
//! shared run statistics the progress display reads ([`StatsStore`]).
//!
//! # Features
//!
//! - Streaming downloads into `<dest>.part`, renamed into place on success
//! - Skips files already present locally with the expected size
//! - Optional per-run byte budget
//! - Cooperative cancellation through a shared [`StopSignal`]

pub mod constants;
mod engine;
pub mod rate_limiter;
mod retry;
mod stats;

pub use constants::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, MAX_CHUNK_SIZE, MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use engine::{
    Budget, Engine, EngineConfig, EngineError, FileOutcome, RunReport, StopSignal,
    destination_for, partial_path,
};
pub use rate_limiter::{LimiterSnapshot, RateLimiter};
pub use retry::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_MAX, FailureType,
    RetryDecision, RetryPolicy, classify_error,
};
pub use stats::{ActiveDownload, Counter, StatsSnapshot, StatsStore};
